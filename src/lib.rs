// Module naming follows project convention (Core = platform primitives, Queue = the ring itself)
#[allow(non_snake_case)]
pub mod Core {
    pub mod SharedMemory;
    pub use SharedMemory::{
        attach_shared_memory, create_shared_memory, unlink_shared_memory, RawHandle,
        SharedMemoryBackend,
    };
    pub mod cursor;
    pub use cursor::{CursorHandle, CursorPool, CursorSlot, Position};
    pub mod alloc;
    pub use alloc::{Allocator, ReadGuard, WriteGuard};
}

#[allow(non_snake_case)]
pub mod Queue {
    mod builder;
    mod consumer;
    mod producer;
    pub use builder::{ConsumerBuilder, ProducerBuilder};
    pub use consumer::Consumer;
    pub use producer::Producer;

    pub mod Record {
        pub mod event;
        pub mod serializer;
        pub use event::{EventHeader, EventType, EventView, MutableEventView};
        pub use serializer::{Arg, DataType};
    }

    pub mod Reader {
        pub mod pool;
        pub mod window;
        pub use pool::{ReaderPool, RecordIter};
        pub use window::WindowQueue;
    }
}

mod config;
pub use config::Config;

mod logging;
pub use logging::{set_logger, LogLevel, LogSink, LoggerHandle};

mod error;
pub use error::{Error, Status};
