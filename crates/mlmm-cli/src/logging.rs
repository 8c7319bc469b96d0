use crate::error::{CliError, Result};
use crate::ui::UiEvent;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use tokio::sync::mpsc;
use tracing_subscriber::{
    filter::LevelFilter,
    fmt::{self, MakeWriter, writer::BoxMakeWriter},
    prelude::*,
};

/// Console logs are routed through the UI channel while progress bars are drawn, so the
/// two do not overwrite each other. Without a channel they go straight to stderr.
pub fn setup_logging(
    verbosity: u8,
    quiet: bool,
    log_file: Option<&Path>,
    ui_sender: Option<mpsc::Sender<UiEvent>>,
) -> Result<()> {
    let level_filter = if quiet {
        LevelFilter::OFF
    } else {
        match verbosity {
            0 => LevelFilter::WARN,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    };

    let console_writer = match ui_sender {
        Some(sender) => BoxMakeWriter::new(UiMakeWriter { sender }),
        None => BoxMakeWriter::new(io::stderr),
    };
    let stderr_layer = fmt::layer()
        .with_writer(console_writer)
        .with_ansi(true)
        .with_target(false)
        .compact();

    let file_layer = match log_file {
        Some(path) => {
            let file = File::create(path).map_err(CliError::Io)?;
            Some(
                fmt::layer()
                    .with_writer(file)
                    .with_ansi(false)
                    .with_thread_ids(true)
                    .with_target(true),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(level_filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| CliError::Other(anyhow::anyhow!("Failed to install logger: {}", e)))
}

struct UiMakeWriter {
    sender: mpsc::Sender<UiEvent>,
}

impl<'a> MakeWriter<'a> for UiMakeWriter {
    type Writer = UiLineWriter;

    fn make_writer(&'a self) -> Self::Writer {
        UiLineWriter {
            sender: self.sender.clone(),
            buffer: Vec::new(),
        }
    }
}

/// Collects one formatted event and hands it to the UI when dropped.
struct UiLineWriter {
    sender: mpsc::Sender<UiEvent>,
    buffer: Vec<u8>,
}

impl Write for UiLineWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for UiLineWriter {
    fn drop(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let text = String::from_utf8_lossy(&self.buffer)
            .trim_end_matches('\n')
            .to_string();
        // The UI task is gone after shutdown; fall back to stderr.
        if let Err(e) = self.sender.try_send(UiEvent::Log(text)) {
            if let UiEvent::Log(text) = e.into_inner() {
                eprintln!("{}", text);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::path::PathBuf;
    use std::sync::Once;
    use std::thread;
    use std::time::Duration;
    use tracing::{debug, error, info, trace, warn};

    static INIT: Once = Once::new();

    fn ensure_global_logger_is_set() {
        INIT.call_once(|| {
            setup_logging(3, false, None, None).expect("Failed to set up global logger for tests");
        });
    }

    #[test]
    #[serial]
    fn initialization_and_macros_work() {
        ensure_global_logger_is_set();

        error!("This is an error");
        warn!("This is a warning");
        info!("This is info");
        debug!("This is debug");
        trace!("This is trace");
    }

    #[test]
    #[serial]
    fn second_initialization_is_an_error_not_a_panic() {
        ensure_global_logger_is_set();
        assert!(matches!(
            setup_logging(0, false, None, None),
            Err(CliError::Other(_))
        ));
    }

    #[test]
    #[serial]
    fn file_logging_can_be_added_to_global_logger() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log_path = temp_dir.path().join("test.log");

        let file = File::create(log_path.clone()).unwrap();
        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_thread_ids(true);
        let subscriber = tracing_subscriber::registry().with(file_layer);

        tracing::subscriber::with_default(subscriber, || {
            let test_message = "Message for file-only test.";
            debug!("{}", test_message);
        });

        thread::sleep(Duration::from_millis(100));

        let content = std::fs::read_to_string(log_path).unwrap();
        assert!(content.contains("Message for file-only test."));
        assert!(content.contains("DEBUG"));
        assert!(content.contains("ThreadId"));
    }

    #[test]
    #[serial]
    fn console_events_are_forwarded_to_the_ui() {
        let (sender, mut receiver) = mpsc::channel(8);
        let layer = fmt::layer()
            .with_writer(UiMakeWriter { sender })
            .with_ansi(false)
            .compact();
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            info!("Frame written");
        });

        match receiver.try_recv() {
            Ok(UiEvent::Log(line)) => {
                assert!(line.contains("Frame written"));
                assert!(!line.ends_with('\n'));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    #[serial]
    fn invalid_log_file_path_propagates_error() {
        let invalid_path = PathBuf::from("/");

        if cfg!(unix) && invalid_path.is_dir() {
            let result = setup_logging(0, false, Some(&invalid_path), None);
            assert!(matches!(result, Err(CliError::Io(_))));
        }
    }
}
