//! Per-job logger with file and callback output.

use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use parking_lot::Mutex;

use super::types::{LogCallback, LogConfig, LogLevel, MessagePrefix};

/// Per-job logger: one log file per job, optional line callback, and a
/// tail ring buffer for error diagnosis.
pub struct JobLogger {
    job_id: String,
    log_path: Option<PathBuf>,
    file_writer: Mutex<Option<BufWriter<File>>>,
    callback: Mutex<Option<LogCallback>>,
    config: LogConfig,
    tail: Mutex<VecDeque<String>>,
}

impl JobLogger {
    /// Create a logger writing to `<log_dir>/<job_id>.log`.
    pub fn new(
        job_id: impl Into<String>,
        log_dir: impl AsRef<Path>,
        config: LogConfig,
        callback: Option<LogCallback>,
    ) -> std::io::Result<Self> {
        let job_id = job_id.into();
        let log_dir = log_dir.as_ref();
        fs::create_dir_all(log_dir)?;

        let log_path = log_dir.join(format!("{}.log", sanitize_filename(&job_id)));
        let writer = BufWriter::new(File::create(&log_path)?);

        Ok(Self {
            job_id,
            log_path: Some(log_path),
            file_writer: Mutex::new(Some(writer)),
            callback: Mutex::new(callback),
            config,
            tail: Mutex::new(VecDeque::new()),
        })
    }

    /// A logger with no file and no callback; the tail buffer still works.
    /// Used by tests and embedded harnesses.
    pub fn null(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            log_path: None,
            file_writer: Mutex::new(None),
            callback: Mutex::new(None),
            config: LogConfig::default(),
            tail: Mutex::new(VecDeque::new()),
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn log_path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }

    pub fn log(&self, level: LogLevel, message: &str) {
        if level < self.config.level {
            return;
        }
        let formatted = self.format_message(message);
        self.output(&formatted);
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, &MessagePrefix::Warning.format(message));
    }

    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, &MessagePrefix::Error.format(message));
    }

    /// Mark a stage boundary.
    pub fn phase(&self, stage_name: &str) {
        self.log(LogLevel::Info, &MessagePrefix::Phase.format(stage_name));
    }

    /// Surface a measurement line.
    pub fn measure(&self, message: &str) {
        self.log(LogLevel::Info, &MessagePrefix::Measure.format(message));
    }

    pub fn success(&self, message: &str) {
        self.log(LogLevel::Info, &MessagePrefix::Success.format(message));
    }

    /// Recent lines, oldest first.
    pub fn tail(&self) -> Vec<String> {
        self.tail.lock().iter().cloned().collect()
    }

    pub fn flush(&self) {
        if let Some(writer) = self.file_writer.lock().as_mut() {
            let _ = writer.flush();
        }
    }

    fn format_message(&self, message: &str) -> String {
        if self.config.show_timestamps {
            format!("[{}] {}", Local::now().format("%H:%M:%S"), message)
        } else {
            message.to_string()
        }
    }

    fn output(&self, formatted: &str) {
        {
            let mut tail = self.tail.lock();
            if tail.len() >= self.config.tail_lines {
                tail.pop_front();
            }
            tail.push_back(formatted.to_string());
        }

        if let Some(writer) = self.file_writer.lock().as_mut() {
            let _ = writeln!(writer, "{}", formatted);
        }

        if let Some(callback) = self.callback.lock().as_ref() {
            callback(formatted);
        }
    }
}

impl Drop for JobLogger {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Replace path-hostile characters so the job id can name a file.
fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn writes_log_file() {
        let dir = tempdir().unwrap();
        let logger = JobLogger::new("job-1", dir.path(), LogConfig::default(), None).unwrap();
        logger.info("hello");
        logger.flush();

        let content = fs::read_to_string(logger.log_path().unwrap()).unwrap();
        assert!(content.contains("hello"));
    }

    #[test]
    fn callback_sees_every_line() {
        let dir = tempdir().unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let callback: LogCallback = Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let logger =
            JobLogger::new("job-2", dir.path(), LogConfig::default(), Some(callback)).unwrap();

        logger.info("one");
        logger.phase("S9_MASTER");
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn level_filters_debug() {
        let logger = JobLogger::null("job-3");
        logger.debug("invisible");
        logger.info("visible");
        let tail = logger.tail();
        assert_eq!(tail.len(), 1);
        assert!(tail[0].contains("visible"));
    }

    #[test]
    fn tail_is_bounded() {
        let mut config = LogConfig::default();
        config.tail_lines = 3;
        config.show_timestamps = false;
        let logger = JobLogger {
            job_id: "j".to_string(),
            log_path: None,
            file_writer: Mutex::new(None),
            callback: Mutex::new(None),
            config,
            tail: Mutex::new(VecDeque::new()),
        };
        for i in 0..10 {
            logger.info(&format!("line {i}"));
        }
        let tail = logger.tail();
        assert_eq!(tail, vec!["line 7", "line 8", "line 9"]);
    }

    #[test]
    fn sanitizes_job_ids() {
        assert_eq!(sanitize_filename("a/b:c"), "a_b_c");
    }
}
