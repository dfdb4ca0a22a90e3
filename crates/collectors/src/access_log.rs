//! Access-log tailing and slow-request tracking.
//!
//! Reads the last chunk of the access log each tick, parses the common
//! Tomcat pattern `%h %l %u %t "%r" %s %b %D` (response time in
//! milliseconds), and derives request statistics plus a bounded window of
//! slow requests for the read API.

use std::collections::VecDeque;
use std::io::SeekFrom;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::SystemTime;

use async_trait::async_trait;
use regex::Regex;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use watchbeat_core::collector::{CollectorError, RequestStatsSource};
use watchbeat_core::config::AccessLogConfig;
use watchbeat_core::models::{RequestStats, SlowRequest};

/// Bytes read from the end of the file per tick. Rotation keeps the file
/// small in practice; this bounds the worst case.
const TAIL_BYTES: u64 = 512 * 1024;

const LOG_PATTERN: &str = concat!(
    r#"^(?P<ip>\S+) \S+ \S+ "#,
    r#"\[(?P<timestamp>[^\]]+)\] "#,
    r#""(?P<method>\w+) (?P<path>\S+)[^"]*" "#,
    r#"(?P<status>\d{3}) (?P<bytes>\d+|-) (?P<response_time>\d+|-)"#,
);

#[derive(Debug)]
struct SlowState {
    window: VecDeque<SlowRequest>,
    /// Timestamp of the newest entry already folded into the window, so a
    /// re-read of the same tail does not duplicate it. Second resolution.
    seen_through: Option<SystemTime>,
}

#[derive(Debug)]
pub struct AccessLogCollector {
    path: PathBuf,
    pattern: Regex,
    slow_threshold_ms: u64,
    tail_lines: usize,
    slow_window: usize,
    state: Mutex<SlowState>,
}

impl AccessLogCollector {
    pub fn new(config: &AccessLogConfig) -> Result<Self, regex::Error> {
        Ok(Self {
            path: PathBuf::from(&config.path),
            pattern: Regex::new(LOG_PATTERN)?,
            slow_threshold_ms: config.slow_threshold_ms,
            tail_lines: config.tail_lines,
            slow_window: config.slow_window,
            state: Mutex::new(SlowState {
                window: VecDeque::with_capacity(config.slow_window),
                seen_through: None,
            }),
        })
    }

    fn parse_line(&self, line: &str) -> Option<SlowRequest> {
        let captures = self.pattern.captures(line.trim())?;
        let at = chrono::DateTime::parse_from_str(
            captures.name("timestamp")?.as_str(),
            "%d/%b/%Y:%H:%M:%S %z",
        )
        .ok()?;
        let response_time_ms = match captures.name("response_time")?.as_str() {
            "-" => 0,
            raw => raw.parse::<u64>().ok()?,
        };

        Some(SlowRequest {
            at: SystemTime::from(at),
            method: captures.name("method")?.as_str().to_owned(),
            path: captures.name("path")?.as_str().to_owned(),
            status: captures.name("status")?.as_str().parse().ok()?,
            response_time_ms,
            client: captures.name("ip")?.as_str().to_owned(),
        })
    }

    async fn tail(&self) -> Result<Vec<String>, CollectorError> {
        let mut file = tokio::fs::File::open(&self.path).await.map_err(|error| {
            CollectorError::Unavailable(format!("{}: {error}", self.path.display()))
        })?;
        let len = file
            .metadata()
            .await
            .map_err(|error| CollectorError::Unavailable(error.to_string()))?
            .len();

        let start = len.saturating_sub(TAIL_BYTES);
        if start > 0 {
            file.seek(SeekFrom::Start(start))
                .await
                .map_err(|error| CollectorError::Unavailable(error.to_string()))?;
        }
        let mut raw = Vec::new();
        file.read_to_end(&mut raw)
            .await
            .map_err(|error| CollectorError::Unavailable(error.to_string()))?;

        let text = String::from_utf8_lossy(&raw);
        let mut lines: Vec<&str> = text.lines().collect();
        if start > 0 && !lines.is_empty() {
            // The seek may have landed mid-line.
            lines.remove(0);
        }
        let skip = lines.len().saturating_sub(self.tail_lines);
        Ok(lines.into_iter().skip(skip).map(str::to_owned).collect())
    }
}

#[async_trait]
impl RequestStatsSource for AccessLogCollector {
    async fn request_stats(&self) -> Result<RequestStats, CollectorError> {
        let lines = self.tail().await?;
        let entries: Vec<SlowRequest> = lines
            .iter()
            .filter_map(|line| self.parse_line(line))
            .collect();

        let request_count = entries.len() as u64;
        let timed: Vec<u64> = entries
            .iter()
            .map(|entry| entry.response_time_ms)
            .filter(|&ms| ms > 0)
            .collect();
        let avg_response_ms = if timed.is_empty() {
            0.0
        } else {
            timed.iter().sum::<u64>() as f64 / timed.len() as f64
        };
        let max_response_ms = timed.iter().max().copied().unwrap_or(0) as f64;

        let slow: Vec<SlowRequest> = entries
            .into_iter()
            .filter(|entry| entry.response_time_ms >= self.slow_threshold_ms)
            .collect();
        let slow_request_count = slow.len() as u64;

        let slow_requests = {
            let mut state = match self.state.lock() {
                Ok(state) => state,
                Err(poisoned) => poisoned.into_inner(),
            };
            for entry in slow {
                if state.seen_through.is_some_and(|seen| entry.at <= seen) {
                    continue;
                }
                if state.window.len() == self.slow_window {
                    state.window.pop_front();
                }
                state.window.push_back(entry);
            }
            if let Some(newest) = state.window.back() {
                state.seen_through = Some(newest.at);
            }
            // Newest first for the read API.
            state.window.iter().rev().cloned().collect()
        };

        Ok(RequestStats {
            request_count,
            slow_request_count,
            avg_response_ms,
            max_response_ms,
            slow_requests,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn collector_for(path: &str, slow_threshold_ms: u64) -> Option<AccessLogCollector> {
        AccessLogCollector::new(&AccessLogConfig {
            path: path.to_owned(),
            slow_threshold_ms,
            tail_lines: 100,
            slow_window: 10,
        })
        .ok()
    }

    #[test]
    fn parses_common_tomcat_access_line() {
        let Some(collector) = collector_for("/dev/null", 5000) else {
            return;
        };
        let line = r#"192.168.1.10 - - [01/Aug/2026:12:00:00 +0000] "GET /api/users HTTP/1.1" 200 1234 6200"#;
        let parsed = collector.parse_line(line);
        assert!(parsed.is_some());
        let Some(entry) = parsed else { return };
        assert_eq!(entry.method, "GET");
        assert_eq!(entry.path, "/api/users");
        assert_eq!(entry.status, 200);
        assert_eq!(entry.response_time_ms, 6200);
        assert_eq!(entry.client, "192.168.1.10");
    }

    #[test]
    fn missing_response_time_parses_as_zero() {
        let Some(collector) = collector_for("/dev/null", 5000) else {
            return;
        };
        let line = r#"10.0.0.1 - - [01/Aug/2026:12:00:00 +0000] "POST /login HTTP/1.1" 302 - -"#;
        let parsed = collector.parse_line(line);
        assert_eq!(parsed.map(|e| e.response_time_ms), Some(0));
    }

    #[test]
    fn garbage_lines_are_skipped() {
        let Some(collector) = collector_for("/dev/null", 5000) else {
            return;
        };
        assert!(collector.parse_line("not an access log line").is_none());
        assert!(collector.parse_line("").is_none());
    }

    #[tokio::test]
    async fn derives_stats_and_slow_window_from_file() {
        let file = tempfile::NamedTempFile::new();
        assert!(file.is_ok());
        let Ok(mut file) = file else { return };
        let lines = [
            r#"10.0.0.1 - - [01/Aug/2026:12:00:00 +0000] "GET /fast HTTP/1.1" 200 100 120"#,
            r#"10.0.0.2 - - [01/Aug/2026:12:00:01 +0000] "GET /slow HTTP/1.1" 200 100 7000"#,
            r#"10.0.0.3 - - [01/Aug/2026:12:00:02 +0000] "GET /slower HTTP/1.1" 500 100 9000"#,
            "garbage line",
        ];
        for line in lines {
            let written = writeln!(file, "{line}");
            assert!(written.is_ok());
        }

        let path = file.path().to_string_lossy().into_owned();
        let Some(collector) = collector_for(&path, 5000) else {
            return;
        };
        let stats = collector.request_stats().await;
        assert!(stats.is_ok());
        let Ok(stats) = stats else { return };

        assert_eq!(stats.request_count, 3);
        assert_eq!(stats.slow_request_count, 2);
        assert!((stats.avg_response_ms - (120.0 + 7000.0 + 9000.0) / 3.0).abs() < 1e-9);
        assert_eq!(stats.max_response_ms, 9000.0);
        assert_eq!(stats.slow_requests.len(), 2);
        // Newest first.
        assert_eq!(
            stats.slow_requests.first().map(|r| r.path.clone()),
            Some("/slower".to_owned())
        );

        // A second pass over the same tail must not duplicate the window.
        let again = collector.request_stats().await;
        assert!(again.is_ok());
        let Ok(again) = again else { return };
        assert_eq!(again.slow_requests.len(), 2);
    }

    #[tokio::test]
    async fn missing_file_is_unavailable_not_a_crash() {
        let Some(collector) = collector_for("/nonexistent/access.log", 5000) else {
            return;
        };
        let stats = collector.request_stats().await;
        assert!(matches!(stats, Err(CollectorError::Unavailable(_))));
    }
}
