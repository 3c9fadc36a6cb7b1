pub mod audio;
pub mod events;
pub mod playlist;
pub mod session;

pub use audio::{Modality, Voice};
pub use events::{ClientEvent, ServerEvent};
pub use playlist::{Playlist, PlaylistDocument, PlaylistStep};
pub use session::{SessionDescriptor, SessionRequest};
