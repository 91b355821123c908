pub mod classifier;
pub mod cli;
pub mod config;
pub mod controller;
pub mod frame;
pub mod gesture;
pub mod positions;

pub use classifier::{Classifier, ClassifyError, HttpClassifier};
pub use cli::{execute, run_cli, sample_once, Cli, Commands, ConfigSubcommand};
pub use config::{current_policy, load_config, save_config, Config};
pub use controller::{start, CycleOutcome, Liveness, PollController, PollHandle, PollPolicy};
pub use frame::{EncodedFrame, FrameSampler, FrameSource};
pub use gesture::{ClassificationResult, HandPosition, InteractionState, SceneHandle, SceneSnapshot};
