//! Dictionary provider: externally supplied character and phrase tables.
//!
//! - [`PhraseTable`]: phrase → replacement with length metadata for
//!   longest-match scanning.
//! - [`CharTable`]: per-character view used by the character-mapping engine.
//! - [`StarterUnion`]: merged starter masks for the tables of one round.
//! - [`Dictionary`]: the named tables, loadable from text files or a
//!   compressed bundle.

mod char_table;
mod dictionary;
mod phrase_table;
mod starter_union;

pub use self::char_table::CharTable;
pub use self::dictionary::Dictionary;
pub use self::phrase_table::PhraseTable;
pub use self::starter_union::StarterUnion;
pub use crate::error::DictionaryError;
