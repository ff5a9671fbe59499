//! Plain-text booth display for a kiosk terminal.

use snapbooth_core::{BoothDisplay, Notice, NoticeKind, RetrievalDescriptor};
use std::io::Write;

pub struct TerminalRenderer<W> {
    out: W,
}

impl<W: Write + Send> TerminalRenderer<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, text: &str) {
        if let Err(e) = writeln!(self.out, "{text}").and_then(|_| self.out.flush()) {
            tracing::warn!(error = %e, "display write failed");
        }
    }
}

impl<W: Write + Send> BoothDisplay for TerminalRenderer<W> {
    fn countdown(&mut self, remaining: u32) {
        self.line(&format!("  {remaining}..."));
    }

    fn render(&mut self, descriptor: &RetrievalDescriptor) {
        tracing::debug!(key = %descriptor.key, "showing retrieval code");
        self.line("");
        self.line("  Your photo is ready!");
        self.line(&format!("  Code: {}", descriptor.key));
        self.line(&format!("  Link: {}", descriptor.url));
        self.line("");
    }

    fn clear_result(&mut self) {
        // ANSI clear screen + home
        self.line("\x1b[2J\x1b[H");
    }

    fn notify(&mut self, notice: &Notice) {
        tracing::debug!(kind = ?notice.kind, "showing notice");
        let lead = match notice.kind {
            NoticeKind::CaptureFailed => "Could not take the photo",
            NoticeKind::UploadFailed => "Could not save the photo",
            NoticeKind::Internal => "Something went wrong",
        };
        self.line(&format!("  {lead}: {}", notice.message));
    }

    fn idle(&mut self) {
        self.line("  Step in front of the camera to take a photo.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(r: TerminalRenderer<Vec<u8>>) -> String {
        String::from_utf8(r.into_inner()).unwrap()
    }

    #[test]
    fn test_render_shows_code_and_link() {
        let mut r = TerminalRenderer::new(Vec::new());
        r.render(&RetrievalDescriptor {
            key: "photos/1.jpg".into(),
            url: "https://cdn.example.test/1.jpg".into(),
        });
        let text = output(r);
        assert!(text.contains("Code: photos/1.jpg"));
        assert!(text.contains("Link: https://cdn.example.test/1.jpg"));
    }

    #[test]
    fn test_countdown_and_notice() {
        let mut r = TerminalRenderer::new(Vec::new());
        r.countdown(3);
        r.notify(&Notice {
            kind: NoticeKind::UploadFailed,
            message: "bucket unavailable".into(),
        });
        let text = output(r);
        assert!(text.contains("3..."));
        assert!(text.contains("Could not save the photo: bucket unavailable"));
    }
}
