/// A complete server-sent event frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SseFrame {
    pub id: Option<String>,
    pub event: Option<String>,
    pub data: String,
}

/// Incremental `text/event-stream` decoder.
///
/// Bytes arrive in arbitrary chunks; `push` buffers partial lines and returns
/// every frame completed by the chunk. Comment lines (`:`) are dropped and
/// multiple `data:` lines are joined with `\n`.
#[derive(Debug, Default)]
pub struct SseDecoder {
    leftover: String,
    current: SseFrame,
    has_fields: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.leftover.push_str(&String::from_utf8_lossy(chunk));
        let mut frames = Vec::new();

        while let Some(newline_pos) = self.leftover.find('\n') {
            let line: String = self.leftover.drain(..=newline_pos).collect();
            let line = line.trim_end_matches('\n').trim_end_matches('\r');

            if line.is_empty() {
                // Blank line terminates the frame
                if self.has_fields {
                    frames.push(std::mem::take(&mut self.current));
                    self.has_fields = false;
                }
                continue;
            }

            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };

            match field {
                "id" => self.current.id = Some(value.to_string()),
                "event" => self.current.event = Some(value.to_string()),
                "data" => {
                    if !self.current.data.is_empty() {
                        self.current.data.push('\n');
                    }
                    self.current.data.push_str(value);
                }
                _ => continue,
            }
            self.has_fields = true;
        }

        frames
    }
}
