use std::collections::BTreeSet;

use tracing::debug;

use crate::sim::{EntityHandle, Vec3};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidateState {
    pub handle: EntityHandle,
    pub position: Vec3,
    pub is_usable: bool,
    pub usable_outside_view: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewpoint {
    pub position: Vec3,
    pub forward: Vec3,
    pub field_of_view_degrees: f32,
}

impl Viewpoint {
    pub fn can_see(&self, candidate: &CandidateState) -> bool {
        if candidate.usable_outside_view {
            return true;
        }
        let to_candidate = candidate.position - self.position;
        if to_candidate.length() <= f32::EPSILON {
            return true;
        }
        self.forward.angle_degrees(to_candidate) <= self.field_of_view_degrees * 0.5
    }

    pub fn distance_to(&self, candidate: &CandidateState) -> f32 {
        self.position.distance(candidate.position)
    }
}

/// World-side view of the candidates an arbiter may point at.
pub trait CandidateHost {
    type Interaction;

    /// `None` once the candidate has been destroyed.
    fn candidate(&self, handle: EntityHandle) -> Option<CandidateState>;
    fn interact(&mut self, handle: EntityHandle) -> Self::Interaction;
    fn inflate(&mut self, handle: EntityHandle);
    fn deflate(&mut self, handle: EntityHandle);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsiderOutcome {
    Acquired,
    Replaced { previous: EntityHandle },
    Kept,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropOutcome {
    Cleared(EntityHandle),
    NotCurrent,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome<R> {
    NoTarget,
    Unusable(EntityHandle),
    OutOfRange(EntityHandle),
    Interacted { target: EntityHandle, result: R },
}

/// Picks the single interaction target for one requesting unit.
#[derive(Debug, Default)]
pub struct TargetArbiter {
    in_range: BTreeSet<EntityHandle>,
    current: Option<EntityHandle>,
}

impl TargetArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<EntityHandle> {
        self.current
    }

    pub fn in_range(&self) -> impl Iterator<Item = EntityHandle> + '_ {
        self.in_range.iter().copied()
    }

    pub fn is_in_range(&self, handle: EntityHandle) -> bool {
        self.in_range.contains(&handle)
    }

    pub fn enter_proximity(&mut self, handle: EntityHandle) -> bool {
        self.in_range.insert(handle)
    }

    /// Safe to call repeatedly; also releases the candidate if it is current.
    pub fn exit_proximity<H: CandidateHost>(
        &mut self,
        handle: EntityHandle,
        host: &mut H,
    ) -> DropOutcome {
        self.in_range.remove(&handle);
        self.drop(handle, host)
    }

    pub fn consider<H: CandidateHost>(
        &mut self,
        candidate: &CandidateState,
        viewpoint: &Viewpoint,
        host: &mut H,
    ) -> ConsiderOutcome {
        if !candidate.is_usable {
            return ConsiderOutcome::Rejected;
        }
        let Some(current) = self.current else {
            self.current = Some(candidate.handle);
            host.inflate(candidate.handle);
            debug!(target = candidate.handle.id.0, "interaction_target_acquired");
            return ConsiderOutcome::Acquired;
        };
        if current == candidate.handle {
            return ConsiderOutcome::Kept;
        }

        if !Self::should_replace(host.candidate(current), candidate, viewpoint) {
            return ConsiderOutcome::Kept;
        }

        host.deflate(current);
        self.current = Some(candidate.handle);
        host.inflate(candidate.handle);
        debug!(
            previous = current.id.0,
            target = candidate.handle.id.0,
            "interaction_target_replaced"
        );
        ConsiderOutcome::Replaced { previous: current }
    }

    // Visibility outranks distance; equal distance keeps the incumbent.
    fn should_replace(
        current: Option<CandidateState>,
        candidate: &CandidateState,
        viewpoint: &Viewpoint,
    ) -> bool {
        let Some(current) = current else {
            return true;
        };
        if !current.is_usable {
            return true;
        }
        if !viewpoint.can_see(candidate) {
            return false;
        }
        if !viewpoint.can_see(&current) {
            return true;
        }
        viewpoint.distance_to(candidate) < viewpoint.distance_to(&current)
    }

    pub fn drop<H: CandidateHost>(&mut self, handle: EntityHandle, host: &mut H) -> DropOutcome {
        if self.current != Some(handle) {
            return DropOutcome::NotCurrent;
        }
        self.current = None;
        host.deflate(handle);
        DropOutcome::Cleared(handle)
    }

    /// Interacts with the current target when it is usable and within
    /// `radius`. The target is released whatever the outcome.
    pub fn commit<H: CandidateHost>(
        &mut self,
        position: Vec3,
        radius: f32,
        host: &mut H,
    ) -> CommitOutcome<H::Interaction> {
        let Some(target) = self.current else {
            return CommitOutcome::NoTarget;
        };
        let outcome = match host.candidate(target) {
            None => {
                self.in_range.remove(&target);
                CommitOutcome::Unusable(target)
            }
            Some(state) if !state.is_usable => CommitOutcome::Unusable(target),
            Some(state) if position.distance(state.position) > radius => {
                CommitOutcome::OutOfRange(target)
            }
            Some(_) => CommitOutcome::Interacted {
                target,
                result: host.interact(target),
            },
        };
        self.drop(target, host);
        outcome
    }

    /// Per-tick sight pass over the in-range set.
    pub fn refresh<H: CandidateHost>(&mut self, viewpoint: &Viewpoint, radius: f32, host: &mut H) {
        if let Some(current) = self.current {
            if host.candidate(current).is_none() {
                self.in_range.remove(&current);
                self.drop(current, host);
            }
        }

        let handles: Vec<EntityHandle> = self.in_range.iter().copied().collect();
        for handle in handles {
            match host.candidate(handle) {
                Some(state) if state.is_usable => {
                    if viewpoint.distance_to(&state) <= radius && viewpoint.can_see(&state) {
                        self.consider(&state, viewpoint, host);
                    } else {
                        self.drop(handle, host);
                    }
                }
                _ => {
                    self.in_range.remove(&handle);
                    self.drop(handle, host);
                }
            }
        }
    }

    pub fn clear<H: CandidateHost>(&mut self, host: &mut H) {
        self.in_range.clear();
        if let Some(current) = self.current.take() {
            host.deflate(current);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{handle, FakeHost};

    fn viewer() -> Viewpoint {
        Viewpoint {
            position: Vec3::ZERO,
            forward: Vec3::FORWARD,
            field_of_view_degrees: 120.0,
        }
    }

    fn ahead(distance: f32) -> Vec3 {
        Vec3::new(0.0, 0.0, distance)
    }

    fn behind(distance: f32) -> Vec3 {
        Vec3::new(0.0, 0.0, -distance)
    }

    #[test]
    fn first_usable_candidate_is_acquired_and_inflated() {
        let mut host = FakeHost::default();
        let mut arbiter = TargetArbiter::new();
        let candidate = host.add(1, ahead(3.0));
        assert_eq!(
            arbiter.consider(&candidate, &viewer(), &mut host),
            ConsiderOutcome::Acquired
        );
        assert_eq!(arbiter.current(), Some(handle(1)));
        assert_eq!(host.inflated, vec![handle(1)]);
    }

    #[test]
    fn unusable_candidate_is_rejected() {
        let mut host = FakeHost::default();
        let mut arbiter = TargetArbiter::new();
        host.add(1, ahead(3.0));
        host.update(1, |state| state.is_usable = false);
        assert_eq!(
            arbiter.consider(&host.state(1), &viewer(), &mut host),
            ConsiderOutcome::Rejected
        );
        assert_eq!(arbiter.current(), None);
    }

    #[test]
    fn visible_current_beats_closer_hidden_candidate() {
        let mut host = FakeHost::default();
        let mut arbiter = TargetArbiter::new();
        let visible = host.add(1, ahead(10.0));
        let hidden = host.add(2, behind(2.0));
        arbiter.consider(&visible, &viewer(), &mut host);
        assert_eq!(
            arbiter.consider(&hidden, &viewer(), &mut host),
            ConsiderOutcome::Kept
        );
        assert_eq!(arbiter.current(), Some(handle(1)));
    }

    #[test]
    fn visible_candidate_replaces_closer_hidden_current() {
        let mut host = FakeHost::default();
        let mut arbiter = TargetArbiter::new();
        let hidden = host.add(1, behind(2.0));
        let visible = host.add(2, ahead(10.0));
        arbiter.consider(&hidden, &viewer(), &mut host);
        assert_eq!(
            arbiter.consider(&visible, &viewer(), &mut host),
            ConsiderOutcome::Replaced {
                previous: handle(1)
            }
        );
        assert_eq!(arbiter.current(), Some(handle(2)));
        assert_eq!(host.deflated, vec![handle(1)]);
    }

    #[test]
    fn equal_distance_keeps_incumbent() {
        let mut host = FakeHost::default();
        let mut arbiter = TargetArbiter::new();
        let first = host.add(1, Vec3::new(3.0, 0.0, 4.0));
        let second = host.add(2, Vec3::new(-3.0, 0.0, 4.0));
        arbiter.consider(&first, &viewer(), &mut host);
        assert_eq!(
            arbiter.consider(&second, &viewer(), &mut host),
            ConsiderOutcome::Kept
        );
        assert_eq!(arbiter.current(), Some(handle(1)));
    }

    #[test]
    fn strictly_closer_visible_candidate_wins() {
        let mut host = FakeHost::default();
        let mut arbiter = TargetArbiter::new();
        let far = host.add(1, ahead(6.0));
        let near = host.add(2, ahead(2.0));
        arbiter.consider(&far, &viewer(), &mut host);
        assert!(matches!(
            arbiter.consider(&near, &viewer(), &mut host),
            ConsiderOutcome::Replaced { .. }
        ));
    }

    #[test]
    fn usable_outside_view_counts_as_visible() {
        let mut host = FakeHost::default();
        let mut arbiter = TargetArbiter::new();
        let far = host.add(1, ahead(6.0));
        host.add(2, behind(2.0));
        host.update(2, |state| state.usable_outside_view = true);
        arbiter.consider(&far, &viewer(), &mut host);
        assert!(matches!(
            arbiter.consider(&host.state(2), &viewer(), &mut host),
            ConsiderOutcome::Replaced { .. }
        ));
    }

    #[test]
    fn unusable_current_is_replaced_by_anything_usable() {
        let mut host = FakeHost::default();
        let mut arbiter = TargetArbiter::new();
        let current = host.add(1, ahead(1.0));
        let hidden = host.add(2, behind(8.0));
        arbiter.consider(&current, &viewer(), &mut host);
        host.update(1, |state| state.is_usable = false);
        assert!(matches!(
            arbiter.consider(&hidden, &viewer(), &mut host),
            ConsiderOutcome::Replaced { .. }
        ));
    }

    #[test]
    fn drop_only_clears_current() {
        let mut host = FakeHost::default();
        let mut arbiter = TargetArbiter::new();
        let current = host.add(1, ahead(1.0));
        host.add(2, ahead(2.0));
        arbiter.consider(&current, &viewer(), &mut host);
        assert_eq!(arbiter.drop(handle(2), &mut host), DropOutcome::NotCurrent);
        assert_eq!(arbiter.current(), Some(handle(1)));
        assert_eq!(
            arbiter.drop(handle(1), &mut host),
            DropOutcome::Cleared(handle(1))
        );
        assert_eq!(arbiter.drop(handle(1), &mut host), DropOutcome::NotCurrent);
        assert_eq!(host.deflated, vec![handle(1)]);
    }

    #[test]
    fn exit_twice_is_harmless() {
        let mut host = FakeHost::default();
        let mut arbiter = TargetArbiter::new();
        let candidate = host.add(1, ahead(1.0));
        arbiter.enter_proximity(candidate.handle);
        arbiter.consider(&candidate, &viewer(), &mut host);
        assert_eq!(
            arbiter.exit_proximity(candidate.handle, &mut host),
            DropOutcome::Cleared(candidate.handle)
        );
        assert_eq!(
            arbiter.exit_proximity(candidate.handle, &mut host),
            DropOutcome::NotCurrent
        );
        assert!(!arbiter.is_in_range(candidate.handle));
    }

    #[test]
    fn commit_interacts_then_drops() {
        let mut host = FakeHost::default();
        let mut arbiter = TargetArbiter::new();
        let candidate = host.add(1, ahead(2.0));
        arbiter.consider(&candidate, &viewer(), &mut host);
        assert_eq!(
            arbiter.commit(Vec3::ZERO, 4.0, &mut host),
            CommitOutcome::Interacted {
                target: handle(1),
                result: ()
            }
        );
        assert_eq!(host.interactions, vec![handle(1)]);
        assert_eq!(arbiter.current(), None);
        assert_eq!(arbiter.commit(Vec3::ZERO, 4.0, &mut host), CommitOutcome::NoTarget);
    }

    #[test]
    fn commit_out_of_range_or_unusable_does_not_interact() {
        let mut host = FakeHost::default();
        let mut arbiter = TargetArbiter::new();
        let far = host.add(1, ahead(9.0));
        arbiter.consider(&far, &viewer(), &mut host);
        assert_eq!(
            arbiter.commit(Vec3::ZERO, 4.0, &mut host),
            CommitOutcome::OutOfRange(handle(1))
        );
        assert_eq!(arbiter.current(), None);

        let near = host.add(2, ahead(1.0));
        arbiter.consider(&near, &viewer(), &mut host);
        host.update(2, |state| state.is_usable = false);
        assert_eq!(
            arbiter.commit(Vec3::ZERO, 4.0, &mut host),
            CommitOutcome::Unusable(handle(2))
        );
        assert!(host.interactions.is_empty());
    }

    #[test]
    fn commit_on_destroyed_target_is_safe() {
        let mut host = FakeHost::default();
        let mut arbiter = TargetArbiter::new();
        let candidate = host.add(1, ahead(1.0));
        arbiter.enter_proximity(candidate.handle);
        arbiter.consider(&candidate, &viewer(), &mut host);
        host.destroy(1);
        assert_eq!(
            arbiter.commit(Vec3::ZERO, 4.0, &mut host),
            CommitOutcome::Unusable(handle(1))
        );
        assert_eq!(arbiter.current(), None);
        assert!(!arbiter.is_in_range(handle(1)));
    }

    #[test]
    fn refresh_picks_closest_visible_in_range() {
        let mut host = FakeHost::default();
        let mut arbiter = TargetArbiter::new();
        for (id, position) in [(1, ahead(3.5)), (2, ahead(1.5)), (3, behind(1.0)), (4, ahead(7.0))] {
            host.add(id, position);
            arbiter.enter_proximity(handle(id));
        }
        arbiter.refresh(&viewer(), 4.0, &mut host);
        assert_eq!(arbiter.current(), Some(handle(2)));
    }

    #[test]
    fn refresh_drops_current_that_left_view() {
        let mut host = FakeHost::default();
        let mut arbiter = TargetArbiter::new();
        host.add(1, ahead(2.0));
        arbiter.enter_proximity(handle(1));
        arbiter.refresh(&viewer(), 4.0, &mut host);
        assert_eq!(arbiter.current(), Some(handle(1)));

        let turned = Viewpoint {
            forward: Vec3::new(0.0, 0.0, -1.0),
            ..viewer()
        };
        arbiter.refresh(&turned, 4.0, &mut host);
        assert_eq!(arbiter.current(), None);
        assert!(arbiter.is_in_range(handle(1)));
    }

    #[test]
    fn refresh_forgets_destroyed_and_unusable_candidates() {
        let mut host = FakeHost::default();
        let mut arbiter = TargetArbiter::new();
        host.add(1, ahead(2.0));
        host.add(2, ahead(3.0));
        arbiter.enter_proximity(handle(1));
        arbiter.enter_proximity(handle(2));
        arbiter.refresh(&viewer(), 4.0, &mut host);
        assert_eq!(arbiter.current(), Some(handle(1)));

        host.destroy(1);
        host.update(2, |state| state.is_usable = false);
        arbiter.refresh(&viewer(), 4.0, &mut host);
        assert_eq!(arbiter.current(), None);
        assert_eq!(arbiter.in_range().count(), 0);
    }

    #[test]
    fn clear_deflates_current() {
        let mut host = FakeHost::default();
        let mut arbiter = TargetArbiter::new();
        let candidate = host.add(1, ahead(1.0));
        arbiter.enter_proximity(candidate.handle);
        arbiter.consider(&candidate, &viewer(), &mut host);
        arbiter.clear(&mut host);
        assert_eq!(arbiter.current(), None);
        assert_eq!(arbiter.in_range().count(), 0);
        assert_eq!(host.deflated, vec![handle(1)]);
    }

    #[test]
    fn candidate_on_top_of_viewer_is_visible() {
        let host_state = CandidateState {
            handle: handle(1),
            position: Vec3::ZERO,
            is_usable: true,
            usable_outside_view: false,
        };
        assert!(viewer().can_see(&host_state));
    }
}
