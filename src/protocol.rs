//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::domain::{GradingResult, Question, Solution, Stage};
use crate::pipeline::SolveSnapshot;
use crate::practice::RoundSnapshot;

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    /// Submit a photographed problem; the server streams stage transitions
    /// back while it runs.
    Solve {
        #[serde(rename = "imageBase64")]
        image_base64: String,
        mime: Option<String>,
    },
    SolveStatus,
    ClearSolve,
    NewQuestion {
        difficulty: Option<String>,
    },
    SubmitAnswer {
        text: Option<String>,
        #[serde(rename = "imageBase64")]
        image_base64: Option<String>,
        mime: Option<String>,
    },
    ChangeDifficulty {
        difficulty: String,
    },
    /// The user started typing/drawing an answer.
    AnswerStarted,
    Hint,
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    SolveStage {
        stage: Stage,
    },
    Solved {
        solution: Solution,
    },
    /// The solve session was cleared before it finished.
    SolveCleared,
    SolveStatus {
        snapshot: SolveSnapshot,
    },
    Question {
        question: Question,
    },
    AnswerResult {
        grading: GradingResult,
    },
    /// A newer round superseded the one this message answers.
    RoundSuperseded,
    DifficultyChanged {
        refreshed: bool,
        question: Option<Question>,
    },
    Hint {
        text: String,
    },
    Ack,
    Error {
        message: String,
    },
}

//
// HTTP request/response DTOs
//

#[derive(Deserialize)]
pub struct SolveIn {
    #[serde(rename = "imageBase64")]
    pub image_base64: String,
    pub mime: Option<String>,
}

#[derive(Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SolveOut {
    Completed { solution: Solution },
    /// A clear raced the session; nothing was published.
    Superseded,
}

#[derive(Serialize)]
pub struct ClearOut {
    pub cleared: bool,
}

#[derive(Debug, Deserialize)]
pub struct QuestionQuery {
    pub difficulty: Option<String>,
}

#[derive(Deserialize)]
pub struct AnswerIn {
    pub text: Option<String>,
    #[serde(rename = "imageBase64")]
    pub image_base64: Option<String>,
    pub mime: Option<String>,
}

#[derive(Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AnswerOut {
    Graded { grading: GradingResult },
    Superseded,
}

#[derive(Deserialize)]
pub struct DifficultyIn {
    pub difficulty: String,
}

#[derive(Serialize)]
pub struct DifficultyOut {
    pub refreshed: bool,
    pub question: Option<Question>,
}

#[derive(Serialize)]
pub struct HintOut {
    pub text: String,
}

#[derive(Serialize)]
pub struct RoundOut {
    pub round: RoundSnapshot,
}

#[derive(Serialize)]
pub struct AckOut {
    pub ok: bool,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
    /// False when OPENAI_API_KEY was absent at startup; AI-backed calls
    /// will fail with an auth error until it is configured.
    #[serde(rename = "reasonerEnabled")]
    pub reasoner_enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn client_ws_messages_parse_from_tagged_json() {
        let m: ClientWsMessage =
            serde_json::from_value(json!({ "type": "new_question", "difficulty": "Hard" })).unwrap();
        assert!(matches!(m, ClientWsMessage::NewQuestion { difficulty: Some(d) } if d == "Hard"));

        let m: ClientWsMessage = serde_json::from_value(
            json!({ "type": "solve", "imageBase64": "aGk=", "mime": "image/png" }),
        )
        .unwrap();
        assert!(matches!(m, ClientWsMessage::Solve { .. }));

        let m: ClientWsMessage = serde_json::from_value(json!({ "type": "answer_started" })).unwrap();
        assert!(matches!(m, ClientWsMessage::AnswerStarted));
    }

    #[test]
    fn server_ws_messages_serialize_with_type_tags() {
        let v = serde_json::to_value(ServerWsMessage::SolveStage { stage: Stage::Ocr }).unwrap();
        assert_eq!(v, json!({ "type": "solve_stage", "stage": "ocr" }));

        let v = serde_json::to_value(ServerWsMessage::RoundSuperseded).unwrap();
        assert_eq!(v, json!({ "type": "round_superseded" }));
    }

    #[test]
    fn solve_out_tags_the_outcome() {
        let v = serde_json::to_value(SolveOut::Superseded).unwrap();
        assert_eq!(v, json!({ "outcome": "superseded" }));
    }
}
