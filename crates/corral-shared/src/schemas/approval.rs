//! Persisted human-input requests: approvals and questions.

use serde::{Deserialize, Serialize};

use crate::utils::time::epoch_ms;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approve,
    Reject,
    Modify,
}

/// The human's verdict on an approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ApprovalChoice {
    Approve,
    Reject,
    Modify,
}

impl ApprovalChoice {
    pub fn as_status(self) -> ApprovalStatus {
        match self {
            Self::Approve => ApprovalStatus::Approve,
            Self::Reject => ApprovalStatus::Reject,
            Self::Modify => ApprovalStatus::Modify,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub id: u64,
    pub session_id: u64,
    pub tool_call_id: String,
    /// Type tag of the requesting tool, e.g. `shell__execute`.
    pub kind: String,
    pub description: String,
    pub status: ApprovalStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<i64>,
}

impl ApprovalRecord {
    pub fn pending(
        id: u64,
        session_id: u64,
        tool_call_id: impl Into<String>,
        kind: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id,
            session_id,
            tool_call_id: tool_call_id.into(),
            kind: kind.into(),
            description: description.into(),
            status: ApprovalStatus::Pending,
            response: None,
            created_at: epoch_ms(),
            resolved_at: None,
        }
    }

    /// Move to a terminal status. Pending resolves exactly once.
    pub fn resolve(&mut self, choice: ApprovalChoice, response: Option<String>) -> bool {
        if self.status != ApprovalStatus::Pending {
            return false;
        }
        self.status = choice.as_status();
        self.response = response;
        self.resolved_at = Some(epoch_ms());
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionStatus {
    Pending,
    Answered,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionRecord {
    pub id: u64,
    pub session_id: u64,
    pub tool_call_id: String,
    pub question: String,
    pub status: QuestionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answered_at: Option<i64>,
}

impl QuestionRecord {
    pub fn pending(
        id: u64,
        session_id: u64,
        tool_call_id: impl Into<String>,
        question: impl Into<String>,
    ) -> Self {
        Self {
            id,
            session_id,
            tool_call_id: tool_call_id.into(),
            question: question.into(),
            status: QuestionStatus::Pending,
            answer: None,
            created_at: epoch_ms(),
            answered_at: None,
        }
    }

    pub fn answer(&mut self, answer: impl Into<String>) -> bool {
        if self.status != QuestionStatus::Pending {
            return false;
        }
        self.status = QuestionStatus::Answered;
        self.answer = Some(answer.into());
        self.answered_at = Some(epoch_ms());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approval_resolves_exactly_once() {
        let mut a = ApprovalRecord::pending(1, 4, "tc_1", "shell__execute", "git push");
        assert!(a.resolve(ApprovalChoice::Approve, None));
        assert_eq!(a.status, ApprovalStatus::Approve);
        assert!(!a.resolve(ApprovalChoice::Reject, Some("late".into())));
        assert_eq!(a.status, ApprovalStatus::Approve);
    }

    #[test]
    fn question_answer_is_terminal() {
        let mut q = QuestionRecord::pending(2, 4, "tc_9", "file?");
        assert!(q.answer("foo.txt"));
        assert_eq!(q.status, QuestionStatus::Answered);
        assert!(!q.answer("bar.txt"));
        assert_eq!(q.answer.as_deref(), Some("foo.txt"));
    }

    #[test]
    fn choice_wire_form_is_uppercase() {
        assert_eq!(
            serde_json::to_string(&ApprovalChoice::Approve).unwrap(),
            "\"APPROVE\""
        );
    }
}
