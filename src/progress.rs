use std::collections::BTreeMap;

use crate::answer::{AnswerRecord, Status};

/// Completion percentage, floored. Zero when there are no days.
pub fn compute_progress(answers: &[AnswerRecord], total_days: u32) -> u32 {
    if total_days == 0 {
        return 0;
    }
    let completed = answers.iter().filter(|a| a.status == Status::Completed).count() as u64;
    (completed * 100 / u64::from(total_days)) as u32
}

pub fn status_map(answers: &[AnswerRecord]) -> BTreeMap<u32, Status> {
    answers.iter().map(|a| (a.day, a.status)).collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    pub percent: u32,
    pub statuses: BTreeMap<u32, Status>,
}

impl Progress {
    pub fn from_answers(answers: &[AnswerRecord], total_days: u32) -> Self {
        Self {
            percent: compute_progress(answers, total_days),
            statuses: status_map(answers),
        }
    }

    /// Status of a day, not_started when no record exists
    pub fn status(&self, day: u32) -> Status {
        self.statuses.get(&day).copied().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::{compute_progress, Progress};
    use crate::answer::{AnswerRecord, Status};

    fn records(statuses: &[Status]) -> Vec<AnswerRecord> {
        statuses
            .iter()
            .enumerate()
            .map(|(i, status)| AnswerRecord {
                day: i as u32 + 1,
                answer_text: String::new(),
                status: *status,
            })
            .collect()
    }

    #[test]
    fn test_percentage_is_floored() {
        let mut statuses = vec![Status::Completed; 5];
        statuses.extend(vec![Status::NotStarted; 12]);
        assert_eq!(compute_progress(&records(&statuses), 17), 29);

        assert_eq!(compute_progress(&records(&[Status::Completed; 17]), 17), 100);
        assert_eq!(compute_progress(&records(&[Status::InProgress; 3]), 17), 0);
        assert_eq!(compute_progress(&[], 17), 0);
        assert_eq!(compute_progress(&records(&[Status::Completed]), 0), 0);
    }

    #[test]
    fn test_status_map() {
        let progress = Progress::from_answers(
            &records(&[Status::Completed, Status::InProgress, Status::Completed]),
            3,
        );
        assert_eq!(progress.percent, 66);
        assert_eq!(progress.status(1), Status::Completed);
        assert_eq!(progress.status(2), Status::InProgress);
        assert_eq!(progress.status(10), Status::NotStarted);
        assert_eq!(progress.statuses.len(), 3);
    }
}
