// Agent system modules
//
// Role agents share `AgentCore` and the `Agent` trait; the launcher drives
// them through a new project's first phases and hands the result to the
// team services.

pub mod architect;
pub mod base;
pub mod developer;
pub mod errors;
pub mod launcher;
pub mod manager;
pub mod pm;
pub mod prompts;
pub mod qa;
pub mod services;

pub use architect::ArchitectAgent;
pub use base::{Agent, AgentContext, AgentCore, AgentMessage};
pub use developer::DeveloperAgent;
pub use errors::{AgentError, AgentResult};
pub use launcher::{LaunchPhase, LaunchedProject, ProjectConfig, ProjectLauncher, TeamMember};
pub use manager::ManagerAgent;
pub use pm::PmAgent;
pub use qa::QaAgent;
pub use services::TeamServices;
