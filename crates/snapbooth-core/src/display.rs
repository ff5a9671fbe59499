use crate::types::{Notice, RetrievalDescriptor};

/// Renders booth output. Every call is fire-and-forget: nothing the
/// display does can fail a transition.
pub trait BoothDisplay: Send {
    /// Seconds left before the shot.
    fn countdown(&mut self, _remaining: u32) {}

    /// Show how to retrieve the photo.
    fn render(&mut self, descriptor: &RetrievalDescriptor);

    /// Take the retrieval code off screen.
    fn clear_result(&mut self) {}

    /// Transient failure notice.
    fn notify(&mut self, notice: &Notice);

    /// Back to the waiting screen.
    fn idle(&mut self) {}
}
