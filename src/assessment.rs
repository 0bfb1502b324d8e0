//! Assessment lifecycle: examiner slots, status transitions, scoring lock and
//! reconciler eligibility.
//!
//! Everything here is a pure function over an [`AssessmentSnapshot`] read from
//! the store. Only `status` (and the slot / reconciler columns) are persisted;
//! every flag shown to a client is recomputed from the snapshot so stored and
//! displayed state cannot drift apart.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AssessmentStatus {
    Pending,
    Scored,
    Reconciled,
}

impl AssessmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AssessmentStatus::Pending => "pending",
            AssessmentStatus::Scored => "scored",
            AssessmentStatus::Reconciled => "reconciled",
        }
    }

    fn rank(self) -> u8 {
        match self {
            AssessmentStatus::Pending => 0,
            AssessmentStatus::Scored => 1,
            AssessmentStatus::Reconciled => 2,
        }
    }

    /// Status never regresses: returns whichever of the two is further along.
    pub fn advance_to(self, next: AssessmentStatus) -> AssessmentStatus {
        if next.rank() > self.rank() {
            next
        } else {
            self
        }
    }
}

impl fmt::Display for AssessmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssessmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AssessmentStatus::Pending),
            "scored" => Ok(AssessmentStatus::Scored),
            "reconciled" => Ok(AssessmentStatus::Reconciled),
            other => Err(format!("unknown assessment status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExaminerRole {
    A,
    B,
}

/// Who currently holds the two examiner seats of an assessment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExaminerSlots {
    Unassigned,
    SingleExaminer(String),
    TwoExaminers(String, String),
}

/// Result of a user opening an assessment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotClaim {
    /// The user already holds a seat (or just took the only seat they could).
    Unchanged,
    /// The user took a free seat; persist the new slots.
    Claimed(ExaminerSlots),
    /// Both seats are held by other examiners.
    Refused,
}

impl ExaminerSlots {
    /// Builds slots from the nullable `examiner_a` / `examiner_b` columns.
    /// A row with the same examiner in both columns is read as a single seat.
    pub fn from_columns(a: Option<String>, b: Option<String>) -> Self {
        match (a, b) {
            (None, None) => ExaminerSlots::Unassigned,
            (Some(a), None) | (None, Some(a)) => ExaminerSlots::SingleExaminer(a),
            (Some(a), Some(b)) if a == b => ExaminerSlots::SingleExaminer(a),
            (Some(a), Some(b)) => ExaminerSlots::TwoExaminers(a, b),
        }
    }

    pub fn examiner_a(&self) -> Option<&str> {
        match self {
            ExaminerSlots::Unassigned => None,
            ExaminerSlots::SingleExaminer(a) | ExaminerSlots::TwoExaminers(a, _) => Some(a),
        }
    }

    pub fn examiner_b(&self) -> Option<&str> {
        match self {
            ExaminerSlots::TwoExaminers(_, b) => Some(b),
            _ => None,
        }
    }

    pub fn both_assigned(&self) -> bool {
        matches!(self, ExaminerSlots::TwoExaminers(..))
    }

    pub fn role_of(&self, user: &str) -> Option<ExaminerRole> {
        if self.examiner_a() == Some(user) {
            Some(ExaminerRole::A)
        } else if self.examiner_b() == Some(user) {
            Some(ExaminerRole::B)
        } else {
            None
        }
    }

    pub fn holds(&self, user: &str) -> bool {
        self.role_of(user).is_some()
    }

    pub fn claim(&self, user: &str) -> SlotClaim {
        match self {
            ExaminerSlots::Unassigned => {
                SlotClaim::Claimed(ExaminerSlots::SingleExaminer(user.to_string()))
            }
            ExaminerSlots::SingleExaminer(a) if a == user => SlotClaim::Unchanged,
            ExaminerSlots::SingleExaminer(a) => {
                SlotClaim::Claimed(ExaminerSlots::TwoExaminers(a.clone(), user.to_string()))
            }
            ExaminerSlots::TwoExaminers(a, b) if a == user || b == user => SlotClaim::Unchanged,
            ExaminerSlots::TwoExaminers(..) => SlotClaim::Refused,
        }
    }
}

/// How much of the procedure one examiner has scored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExaminerCoverage {
    pub scored_steps: usize,
    pub last_updated: Option<DateTime<Utc>>,
}

impl ExaminerCoverage {
    pub fn covers(&self, step_count: usize) -> bool {
        step_count > 0 && self.scored_steps == step_count
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayStatus {
    Pending,
    Scored,
    ReadyToReconcile,
    Reconciled,
}

#[derive(Debug, Clone)]
pub struct AssessmentSnapshot {
    pub id: String,
    pub student_id: String,
    pub procedure_id: String,
    pub slots: ExaminerSlots,
    pub status: AssessmentStatus,
    pub assigned_reconciler: Option<String>,
    pub reconciled_by: Option<String>,
    pub reconciled_at: Option<DateTime<Utc>>,
    pub step_count: usize,
    pub coverage_a: ExaminerCoverage,
    pub coverage_b: ExaminerCoverage,
}

impl AssessmentSnapshot {
    /// Per-examiner completion. Both are false until two different examiners
    /// hold the seats, so a lone examiner can never complete an assessment.
    pub fn completion(&self) -> (bool, bool) {
        if !self.slots.both_assigned() {
            return (false, false);
        }
        (
            self.coverage_a.covers(self.step_count),
            self.coverage_b.covers(self.step_count),
        )
    }

    /// Status after the latest scoring activity.
    pub fn next_status(&self) -> AssessmentStatus {
        let (a_done, b_done) = self.completion();
        if a_done && b_done {
            self.status.advance_to(AssessmentStatus::Scored)
        } else {
            self.status
        }
    }

    /// The examiner who finished scoring last, once both have covered every step.
    /// Equal timestamps go to examiner B.
    pub fn last_scoring_examiner(&self) -> Option<&str> {
        let (a_done, b_done) = self.completion();
        if !(a_done && b_done) {
            return None;
        }
        let a_last = self.coverage_a.last_updated?;
        let b_last = self.coverage_b.last_updated?;
        if a_last > b_last {
            self.slots.examiner_a()
        } else {
            self.slots.examiner_b()
        }
    }

    pub fn can_user_reconcile(&self, user: &str) -> bool {
        if self.status != AssessmentStatus::Scored {
            return false;
        }
        match self.assigned_reconciler.as_deref() {
            Some(assigned) => assigned == user,
            None => self.last_scoring_examiner() == Some(user),
        }
    }

    /// True when `user` is eligible and nobody has been locked in yet.
    pub fn should_assign_reconciler(&self, user: &str) -> bool {
        self.assigned_reconciler.is_none() && self.can_user_reconcile(user)
    }

    pub fn can_modify_scores(&self, user: &str) -> bool {
        self.slots.holds(user)
            && self.status != AssessmentStatus::Reconciled
            && self.assigned_reconciler.is_none()
    }

    pub fn is_locked(&self) -> bool {
        self.assigned_reconciler.is_some() || self.status == AssessmentStatus::Reconciled
    }

    pub fn examiner_role(&self, user: &str) -> Option<ExaminerRole> {
        self.slots.role_of(user)
    }

    pub fn display_status(&self, user: &str) -> DisplayStatus {
        if !self.slots.both_assigned() {
            return DisplayStatus::Pending;
        }
        match self.status {
            AssessmentStatus::Reconciled => DisplayStatus::Reconciled,
            AssessmentStatus::Scored if self.can_user_reconcile(user) => {
                DisplayStatus::ReadyToReconcile
            }
            AssessmentStatus::Scored => DisplayStatus::Scored,
            AssessmentStatus::Pending => DisplayStatus::Pending,
        }
    }

    /// Status as listed to clients: an assessment without two examiners is
    /// always reported as pending.
    pub fn listed_status(&self) -> AssessmentStatus {
        if self.slots.both_assigned() {
            self.status
        } else {
            AssessmentStatus::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> Option<DateTime<Utc>> {
        Some(Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap())
    }

    fn covered(steps: usize, secs: i64) -> ExaminerCoverage {
        ExaminerCoverage {
            scored_steps: steps,
            last_updated: at(secs),
        }
    }

    fn snapshot(
        slots: ExaminerSlots,
        a: ExaminerCoverage,
        b: ExaminerCoverage,
    ) -> AssessmentSnapshot {
        AssessmentSnapshot {
            id: "sp1".into(),
            student_id: "st1".into(),
            procedure_id: "pr1".into(),
            slots,
            status: AssessmentStatus::Pending,
            assigned_reconciler: None,
            reconciled_by: None,
            reconciled_at: None,
            step_count: 3,
            coverage_a: a,
            coverage_b: b,
        }
    }

    fn pair() -> ExaminerSlots {
        ExaminerSlots::TwoExaminers("alice".into(), "bob".into())
    }

    #[test]
    fn claim_walks_from_unassigned_to_two_examiners() {
        let s0 = ExaminerSlots::Unassigned;
        let SlotClaim::Claimed(s1) = s0.claim("alice") else {
            panic!("expected claim");
        };
        assert_eq!(s1, ExaminerSlots::SingleExaminer("alice".into()));
        assert_eq!(s1.claim("alice"), SlotClaim::Unchanged);

        let SlotClaim::Claimed(s2) = s1.claim("bob") else {
            panic!("expected claim");
        };
        assert_eq!(s2, pair());
        assert_eq!(s2.claim("bob"), SlotClaim::Unchanged);
        assert_eq!(s2.claim("carol"), SlotClaim::Refused);
    }

    #[test]
    fn legacy_equal_columns_read_as_single_seat() {
        let slots = ExaminerSlots::from_columns(Some("alice".into()), Some("alice".into()));
        assert_eq!(slots, ExaminerSlots::SingleExaminer("alice".into()));
        assert!(!slots.both_assigned());
    }

    #[test]
    fn single_examiner_never_reaches_scored() {
        let mut snap = snapshot(
            ExaminerSlots::SingleExaminer("alice".into()),
            covered(3, 10),
            covered(3, 20),
        );
        assert_eq!(snap.completion(), (false, false));
        assert_eq!(snap.next_status(), AssessmentStatus::Pending);
        assert_eq!(snap.last_scoring_examiner(), None);

        snap.slots = ExaminerSlots::Unassigned;
        assert_eq!(snap.next_status(), AssessmentStatus::Pending);
    }

    #[test]
    fn two_complete_examiners_reach_scored_once() {
        let mut snap = snapshot(pair(), covered(3, 10), covered(2, 20));
        assert_eq!(snap.next_status(), AssessmentStatus::Pending);

        snap.coverage_b = covered(3, 30);
        assert_eq!(snap.next_status(), AssessmentStatus::Scored);

        snap.status = AssessmentStatus::Scored;
        assert_eq!(snap.next_status(), AssessmentStatus::Scored);

        snap.status = AssessmentStatus::Reconciled;
        assert_eq!(snap.next_status(), AssessmentStatus::Reconciled);
    }

    #[test]
    fn zero_step_procedure_never_completes() {
        let mut snap = snapshot(pair(), covered(0, 10), covered(0, 20));
        snap.step_count = 0;
        assert_eq!(snap.next_status(), AssessmentStatus::Pending);
    }

    #[test]
    fn last_examiner_uses_latest_update_and_ties_go_to_b() {
        let snap = snapshot(pair(), covered(3, 50), covered(3, 20));
        assert_eq!(snap.last_scoring_examiner(), Some("alice"));

        let snap = snapshot(pair(), covered(3, 20), covered(3, 50));
        assert_eq!(snap.last_scoring_examiner(), Some("bob"));

        let snap = snapshot(pair(), covered(3, 20), covered(3, 20));
        assert_eq!(snap.last_scoring_examiner(), Some("bob"));
    }

    #[test]
    fn reconcile_eligibility_is_exclusive() {
        let mut snap = snapshot(pair(), covered(3, 10), covered(3, 20));
        assert!(!snap.can_user_reconcile("bob"), "pending cannot reconcile");

        snap.status = AssessmentStatus::Scored;
        let eligible: Vec<_> = ["alice", "bob", "carol"]
            .into_iter()
            .filter(|u| snap.can_user_reconcile(u))
            .collect();
        assert_eq!(eligible, vec!["bob"]);
        assert!(snap.should_assign_reconciler("bob"));
        assert!(!snap.should_assign_reconciler("alice"));
    }

    #[test]
    fn assigned_reconciler_overrides_last_examiner() {
        let mut snap = snapshot(pair(), covered(3, 10), covered(3, 20));
        snap.status = AssessmentStatus::Scored;
        snap.assigned_reconciler = Some("alice".into());

        assert!(snap.can_user_reconcile("alice"));
        assert!(!snap.can_user_reconcile("bob"));
        assert!(!snap.should_assign_reconciler("alice"));
        assert_eq!(snap.display_status("alice"), DisplayStatus::ReadyToReconcile);
        assert_eq!(snap.display_status("bob"), DisplayStatus::Scored);
    }

    #[test]
    fn scoring_locks_once_reconciler_assigned_or_reconciled() {
        let mut snap = snapshot(pair(), covered(3, 10), covered(3, 20));
        assert!(snap.can_modify_scores("alice"));
        assert!(!snap.can_modify_scores("carol"));
        assert!(!snap.is_locked());

        snap.status = AssessmentStatus::Scored;
        assert!(snap.can_modify_scores("bob"));

        snap.assigned_reconciler = Some("bob".into());
        assert!(!snap.can_modify_scores("alice"));
        assert!(!snap.can_modify_scores("bob"));
        assert!(snap.is_locked());

        snap.assigned_reconciler = None;
        snap.status = AssessmentStatus::Reconciled;
        assert!(!snap.can_modify_scores("alice"));
        assert!(snap.is_locked());
        assert!(!snap.can_user_reconcile("bob"));
    }

    #[test]
    fn display_status_is_pending_without_two_examiners() {
        let mut snap = snapshot(
            ExaminerSlots::SingleExaminer("alice".into()),
            covered(3, 10),
            ExaminerCoverage::default(),
        );
        snap.status = AssessmentStatus::Scored;
        assert_eq!(snap.display_status("alice"), DisplayStatus::Pending);
        assert_eq!(snap.listed_status(), AssessmentStatus::Pending);
    }

    #[test]
    fn status_parses_and_never_regresses() {
        assert_eq!("scored".parse::<AssessmentStatus>(), Ok(AssessmentStatus::Scored));
        assert!("done".parse::<AssessmentStatus>().is_err());
        assert_eq!(
            AssessmentStatus::Reconciled.advance_to(AssessmentStatus::Pending),
            AssessmentStatus::Reconciled
        );
    }
}
