//! Download sinks
//!
//! A sink receives each drained batch of submission identifiers and hands them
//! to whatever actually fetches the media. Two implementations ship with the
//! crate:
//! - [`CommandSink`] runs a local program with the identifiers as arguments
//! - [`HttpSink`] POSTs the identifiers to a download server

mod command;
mod http;
mod traits;

pub use command::CommandSink;
pub use http::HttpSink;
pub use traits::DownloadSink;

use crate::config::SinkConfig;
use std::sync::Arc;

/// Build the sink described by `config`
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be created.
pub fn from_config(config: &SinkConfig) -> crate::Result<Arc<dyn DownloadSink>> {
    let sink: Arc<dyn DownloadSink> = match config {
        SinkConfig::Command {
            program,
            script,
            args,
        } => {
            let sink = CommandSink::from_path(program)
                .unwrap_or_else(|| CommandSink::new(program.clone()));
            Arc::new(sink.with_script(script.clone()).with_args(args.clone()))
        }
        SinkConfig::Http { url, mode, timeout } => {
            Arc::new(HttpSink::new(url.clone(), *mode, *timeout)?)
        }
    };
    tracing::info!(sink = sink.name(), "Download sink configured");
    Ok(sink)
}
