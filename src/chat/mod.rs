pub mod classifier;
pub mod general;
pub mod orchestrator;
pub mod outcome;
pub mod rag_chain;

pub use classifier::{QueryClassifier, RouteDecision};
pub use general::GeneralChatChain;
pub use orchestrator::{ChatService, TurnReply};
pub use outcome::ChainOutcome;
pub use rag_chain::RagChain;
