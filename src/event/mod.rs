// Progression events published after a check-in is processed.
// Subscribers listen per user and never take part in the check-in itself.

pub use bus::EventBus;
pub use events::ProgressionEvent;

mod bus;
mod events;
