pub mod track;
pub mod player;
pub mod records;
pub mod lastfm;
pub mod ytdl;
pub mod openai;

pub use track::{SongPick, StreamRef, Track, TrackRequester};
pub use player::{PlayerState, PlayerView, RenderPlan};
pub use records::{NaturalKey, PlayRecord, Popularity, RecordId, RequestRecord};
