
// 同階層のファイルをモジュールとしてインポート
pub mod call; // tool-call protocol: extractor, dispatcher, orchestrator
pub mod config;
pub mod context;
pub mod dataset; // in-memory incidents, loader, fetcher
pub mod error;
pub mod eval; // model grading over full turns
pub mod format;
pub mod llm; // completion backends and gateway
pub mod manual;
pub mod prompt;
pub mod tools;

pub use config::Config;
pub use context::AppContext;
pub use error::QaError;

// Ensure .env is loaded for tests before anything else runs in the test process.
#[cfg(test)]
#[ctor::ctor]
fn load_dotenv_for_tests() {
    let _ = dotenvy::dotenv();
}
