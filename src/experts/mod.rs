//! Mixture-of-experts stage: route, prompt, invoke in parallel, merge

pub mod invoker;
pub mod merger;
pub mod policy;
pub mod prompts;
pub mod router;

pub use invoker::{ExpertInvoker, InvocationOutcome};
pub use merger::{ResponseMerger, ScoredSlice};
pub use policy::{OutputPolicy, PolicyOutcome};
pub use prompts::{parse_completion, system_template, PromptBuilder};
pub use router::{classify_topic, topic_signal, ExpertRouter, RoutingDecision};
