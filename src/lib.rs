pub mod adapter;
pub mod config;
pub mod error;
pub mod lang;
pub mod message;
pub mod session;
pub mod transport;

mod util;

pub use adapter::{
    shared_buffer, BufferReader, BufferWriter, FileReader, FileWriter, PipeReader, Reader,
    SharedBuffer, Writer,
};
pub use config::{
    EngineConfig, Preprocessing, QueueConfig, SessionConfig, SourceLang, SpeechGen, TargetLang,
    Transcription, TranscriptionCallback, Translation,
};
pub use error::{ConfigError, ConnectError, ReaderError, SendError, SessionError, WriteError};
pub use lang::LanguageCode;
pub use message::{
    AudioFormat, AudioFrame, SourceTag, TranscriptionEvent, TranscriptionKind,
};
pub use session::{Session, SessionOutcome, SessionState, SessionStats};
pub use transport::{Transport, TransportConfig, TransportConnector, TransportEvent};
