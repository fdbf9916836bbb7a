//! Line-oriented operator console.
//!
//! Input and output both go through channels so the session never touches
//! the terminal directly: `stdio()` wires them to stdin/stdout with two
//! plain threads, tests wire them to a script.

use std::io::{BufRead, Write};

use tokio::sync::mpsc;

/// Handle for printing status lines, cloneable into background tasks.
#[derive(Clone)]
pub struct Printer {
    tx: mpsc::UnboundedSender<String>,
}

impl Printer {
    pub fn say(&self, line: impl AsRef<str>) {
        let _ = self.tx.send(format!("{}\n", line.as_ref()));
    }

    fn prompt(&self, prompt: &str) {
        let _ = self.tx.send(prompt.to_string());
    }
}

pub struct Console {
    input: mpsc::UnboundedReceiver<String>,
    printer: Printer,
    writer: Option<std::thread::JoinHandle<()>>,
}

impl Console {
    /// Console over the process's stdin/stdout.
    pub fn stdio() -> Self {
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();

        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(l) => {
                        if in_tx.send(l).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        });
        let writer = std::thread::spawn(move || {
            let mut stdout = std::io::stdout();
            while let Some(text) = out_rx.blocking_recv() {
                let _ = stdout.write_all(text.as_bytes());
                let _ = stdout.flush();
            }
        });

        let mut console = Self::from_channels(in_rx, out_tx);
        console.writer = Some(writer);
        console
    }

    /// Console over arbitrary channels. Output chunks are either whole lines
    /// (ending in `\n`) or prompts (no newline).
    pub fn from_channels(
        input: mpsc::UnboundedReceiver<String>,
        output: mpsc::UnboundedSender<String>,
    ) -> Self {
        Self {
            input,
            printer: Printer { tx: output },
            writer: None,
        }
    }

    /// Flush pending output. Blocks until every `Printer` clone is gone.
    pub fn finish(self) {
        let Self { printer, writer, .. } = self;
        drop(printer);
        if let Some(writer) = writer {
            let _ = writer.join();
        }
    }

    pub fn printer(&self) -> Printer {
        self.printer.clone()
    }

    pub fn say(&self, line: impl AsRef<str>) {
        self.printer.say(line);
    }

    /// Show `prompt` and wait for one line, trimmed. `None` once input is
    /// closed (end of file), which callers treat as cancellation.
    pub async fn ask(&mut self, prompt: &str) -> Option<String> {
        self.printer.prompt(prompt);
        self.input.recv().await.map(|l| l.trim().to_string())
    }
}
