//! Cross-frame opacity transitions for objects that appear or disappear.
//!
//! A fade is expressed as a linear function of time,
//! `opacity(t) = clamp(t * scale + bias, 0, 1)`, so the renderer can evaluate
//! it without per-frame uploads. Reversing a fade mid-way mirrors the line
//! around the current instant, keeping opacity continuous.

use rustc_hash::FxHashMap;
use sightline_scene::ComponentId;

/// Time-linear opacity ramp handed to the renderer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FadeParams {
    pub scale: f32,
    pub bias: f32,
}

impl FadeParams {
    /// Ramp from fully hidden at `now` to fully visible at `now + duration`.
    pub fn fade_in(now: f32, duration: f32) -> Self {
        Self {
            scale: 1.0 / duration,
            bias: -now / duration,
        }
    }

    /// Ramp from fully visible at `now` to fully hidden at `now + duration`.
    pub fn fade_out(now: f32, duration: f32) -> Self {
        Self {
            scale: -1.0 / duration,
            bias: 1.0 + now / duration,
        }
    }

    /// Opacity at time `t`.
    #[inline]
    pub fn opacity(&self, t: f32) -> f32 {
        (t * self.scale + self.bias).clamp(0.0, 1.0)
    }

    /// The same ramp running the other way, passing through the opacity it
    /// has at `now`.
    #[must_use]
    pub fn reversed_at(&self, now: f32) -> Self {
        Self {
            scale: -self.scale,
            bias: 2.0 * now * self.scale + self.bias,
        }
    }

    /// When a ramp heading towards `visible` reaches its end opacity.
    pub fn end_time(&self, visible: bool) -> f32 {
        if visible {
            (1.0 - self.bias) / self.scale
        } else {
            -self.bias / self.scale
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct FadingState {
    params: FadeParams,
    end_time: f32,
    /// Direction of the latest transition.
    is_visible: bool,
    /// A fade has been computed at least once.
    valid: bool,
    frame_number: u32,
}

impl FadingState {
    fn is_fading(&self, now: f32) -> bool {
        self.valid && now < self.end_time
    }
}

/// Per-object fade state for one view, keyed by component id.
#[derive(Clone, Debug)]
pub struct FadingStateManager {
    states: FxHashMap<ComponentId, FadingState>,
    duration: f32,
}

impl FadingStateManager {
    pub fn new(duration: f32) -> Self {
        Self {
            states: FxHashMap::default(),
            duration,
        }
    }

    pub fn duration(&self) -> f32 {
        self.duration
    }

    pub fn set_duration(&mut self, duration: f32) {
        self.duration = duration;
    }

    /// Record whether `id` is visible this frame. Returns the fade to apply
    /// while a transition is in progress.
    ///
    /// The first observation of an object only records its visibility; a fade
    /// starts on the next change.
    pub fn update_fade(&mut self, id: ComponentId, visible_now: bool, now: f32, frame: u32) -> Option<FadeParams> {
        let duration = self.duration;
        let state = self.states.entry(id).or_insert(FadingState {
            params: FadeParams { scale: 0.0, bias: 1.0 },
            end_time: 0.0,
            is_visible: visible_now,
            valid: false,
            frame_number: frame,
        });

        if state.is_visible != visible_now {
            if state.is_fading(now) {
                state.params = state.params.reversed_at(now);
                state.end_time = state.params.end_time(visible_now);
            } else {
                state.params = if visible_now {
                    FadeParams::fade_in(now, duration)
                } else {
                    FadeParams::fade_out(now, duration)
                };
                state.end_time = now + duration;
            }
            state.is_visible = visible_now;
            state.valid = true;
            tracing::trace!(%id, visible_now, end_time = state.end_time, "fade transition");
        }
        state.frame_number = frame;

        state.is_fading(now).then_some(state.params)
    }

    /// Drop entries not touched in `prev_frame` and entries whose fade has
    /// finished. Nothing is pruned while the view is paused.
    pub fn prune(&mut self, now: f32, prev_frame: u32, paused: bool) {
        if paused {
            return;
        }
        let before = self.states.len();
        self.states
            .retain(|_, s| s.frame_number == prev_frame && !(s.valid && now >= s.end_time));
        let pruned = before - self.states.len();
        if pruned > 0 {
            tracing::trace!(pruned, remaining = self.states.len(), "pruned fading states");
        }
    }

    /// True while `id` has a fade in progress at `now`.
    pub fn is_fading(&self, id: ComponentId, now: f32) -> bool {
        self.states.get(&id).is_some_and(|s| s.is_fading(now))
    }

    pub fn contains(&self, id: ComponentId) -> bool {
        self.states.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn clear(&mut self) {
        self.states.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const ID: ComponentId = ComponentId(7);

    #[test]
    fn test_first_observation_does_not_fade() {
        let mut fading = FadingStateManager::new(0.25);
        assert!(fading.update_fade(ID, true, 1.0, 1).is_none());
        assert!(fading.contains(ID));
    }

    #[test]
    fn test_fade_in_ramps_from_zero_to_one() {
        let mut fading = FadingStateManager::new(0.5);
        fading.update_fade(ID, false, 1.0, 1);
        let params = fading.update_fade(ID, true, 2.0, 2).unwrap();
        assert_relative_eq!(params.opacity(2.0), 0.0);
        assert_relative_eq!(params.opacity(2.25), 0.5);
        assert_relative_eq!(params.opacity(2.5), 1.0);
        assert!(fading.is_fading(ID, 2.4));
        assert!(!fading.is_fading(ID, 2.5));
    }

    #[test]
    fn test_fade_out_ramps_from_one_to_zero() {
        let mut fading = FadingStateManager::new(0.5);
        fading.update_fade(ID, true, 1.0, 1);
        let params = fading.update_fade(ID, false, 3.0, 2).unwrap();
        assert_relative_eq!(params.opacity(3.0), 1.0);
        assert_relative_eq!(params.opacity(3.5), 0.0);
    }

    /// Opacity is continuous at the instant a fade reverses.
    #[test]
    fn test_reversal_preserves_opacity() {
        let mut fading = FadingStateManager::new(1.0);
        fading.update_fade(ID, false, 0.0, 1);
        let fade_in = fading.update_fade(ID, true, 10.0, 2).unwrap();
        let reversal_time = 10.3;
        let before = fade_in.opacity(reversal_time);

        let fade_out = fading.update_fade(ID, false, reversal_time, 3).unwrap();
        assert_relative_eq!(fade_out.opacity(reversal_time), before, epsilon = 1e-5);
        assert!(fade_out.scale < 0.0);
        // Fading back out from 0.3 takes 0.3 seconds.
        assert!(fading.is_fading(ID, 10.55));
        assert!(!fading.is_fading(ID, 10.61));
    }

    #[test]
    fn test_reversal_end_time_for_fade_in() {
        let ramp = FadeParams::fade_out(0.0, 1.0).reversed_at(0.25);
        assert_relative_eq!(ramp.opacity(0.25), 0.75, epsilon = 1e-6);
        assert_relative_eq!(ramp.end_time(true), 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_prune_drops_stale_and_finished() {
        let mut fading = FadingStateManager::new(0.25);
        let other = ComponentId(8);
        fading.update_fade(ID, true, 0.0, 1);
        fading.update_fade(other, true, 0.0, 1);
        fading.update_fade(other, false, 0.1, 2);

        // ID was last touched on frame 1; `other` on frame 2, mid-fade.
        fading.prune(0.2, 2, false);
        assert!(!fading.contains(ID));
        assert!(fading.contains(other));

        fading.update_fade(other, false, 0.2, 3);
        fading.prune(1.0, 3, false);
        assert!(fading.is_empty());
    }

    #[test]
    fn test_prune_is_skipped_while_paused() {
        let mut fading = FadingStateManager::new(0.25);
        fading.update_fade(ID, true, 0.0, 1);
        fading.prune(100.0, 50, true);
        assert_eq!(fading.len(), 1);
    }
}
