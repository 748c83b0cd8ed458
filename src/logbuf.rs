use std::collections::VecDeque;
use std::sync::Mutex;

// Bounded transcript of tool output. Worker threads write; one UI-side
// poller checks has_changed, renders a snapshot, then calls mark_read.
pub struct LogBuffer {
    max_lines: usize,
    state: Mutex<LogState>,
}

#[derive(Default)]
struct LogState {
    lines: VecDeque<String>,
    dirty: bool,
}

impl LogBuffer {
    pub fn new(max_lines: usize) -> Self {
        Self {
            max_lines: max_lines.max(1),
            state: Mutex::new(LogState::default()),
        }
    }

    pub fn write(&self, text: &str) {
        let mut state = self.state.lock().unwrap();
        for line in text.split('\n') {
            if line.trim().is_empty() {
                continue;
            }
            if state.lines.len() >= self.max_lines {
                state.lines.pop_front();
            }
            state.lines.push_back(line.to_string());
        }
        state.dirty = true;
    }

    pub fn snapshot(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.lines.iter().cloned().collect()
    }

    pub fn contents(&self) -> String {
        self.snapshot().join("\n")
    }

    pub fn last_line(&self) -> Option<String> {
        let state = self.state.lock().unwrap();
        state.lines.back().cloned()
    }

    pub fn has_changed(&self) -> bool {
        self.state.lock().unwrap().dirty
    }

    pub fn mark_read(&self) {
        self.state.lock().unwrap().dirty = false;
    }

    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        state.lines.clear();
        state.dirty = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn evicts_oldest_lines_at_capacity() {
        let buf = LogBuffer::new(3);
        for line in ["a", "b", "c", "d"] {
            buf.write(line);
        }
        assert_eq!(buf.snapshot(), vec!["b", "c", "d"]);
    }

    #[test]
    fn splits_multiline_writes_and_drops_blanks() {
        let buf = LogBuffer::new(10);
        buf.write("one\n\n   \ntwo\n");
        assert_eq!(buf.snapshot(), vec!["one", "two"]);
        assert_eq!(buf.contents(), "one\ntwo");
    }

    #[test]
    fn dirty_flag_follows_write_and_mark_read() {
        let buf = LogBuffer::new(4);
        assert!(!buf.has_changed());

        buf.write("hello");
        assert!(buf.has_changed());

        // Reading is not acknowledging.
        let _ = buf.contents();
        assert!(buf.has_changed());

        buf.mark_read();
        assert!(!buf.has_changed());

        buf.write("again");
        assert!(buf.has_changed());
    }

    #[test]
    fn clear_empties_and_marks_changed() {
        let buf = LogBuffer::new(4);
        buf.write("line");
        buf.mark_read();

        buf.clear();
        assert!(buf.snapshot().is_empty());
        assert!(buf.has_changed());
    }

    #[test]
    fn last_line_tracks_most_recent_write() {
        let buf = LogBuffer::new(2);
        assert_eq!(buf.last_line(), None);
        buf.write("first\nsecond");
        assert_eq!(buf.last_line().as_deref(), Some("second"));
    }

    #[test]
    fn concurrent_writers_stay_within_capacity() {
        let buf = Arc::new(LogBuffer::new(16));
        let mut handles = Vec::new();
        for t in 0..4 {
            let buf = Arc::clone(&buf);
            handles.push(std::thread::spawn(move || {
                for i in 0..50 {
                    buf.write(&format!("worker {t} line {i}"));
                }
            }));
        }
        for handle in handles {
            handle.join().expect("writer thread");
        }
        assert_eq!(buf.snapshot().len(), 16);
    }
}
