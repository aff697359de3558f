//! 认知层：单步状态机、完成判定、反思、提示词与过程事件

pub mod completion;
pub mod events;
pub mod loop_;
pub mod prompt;
pub mod reflection;

pub use completion::{remove_patches_to_tests, CompletionEvaluator, CompletionVerdict, TASK_INCOMPLETE_MESSAGE};
pub use events::AgentEvent;
pub use loop_::{StepOutcome, StepRunner, StepTransition};
pub use prompt::{task_message, SYSTEM_PROMPT};
pub use reflection::{ReflectionMode, Reflector, REFLECTION_PREFIX};
