pub mod node;
pub mod pipeline;
pub mod queue;
pub mod runtime;
pub mod store;

pub use node::client::{NodeClient, NodeError};
pub use node::listener::{Listener, ListenerError, ListenerParams};
pub use node::source::ChainSource;
pub use pipeline::fetcher::{Ingestor, IngestorParams};
pub use pipeline::syncer::find_missing_blocks;
pub use pipeline::workers::WorkerPool;
pub use queue::{BlockProcessorQueue, QueueStat};
pub use runtime::config::{IndexerConfig, IndexerConfigBuilder};
pub use runtime::runner::Runner;
pub use runtime::status::{StatusHolder, SyncState};
pub use runtime::telemetry::{init_tracing, Telemetry, TelemetrySnapshot};
pub use store::models::{BlockRow, EventRow, PackedBlock, PackedTransaction, TxRow};
pub use store::persist::Persister;
pub use store::queries::StoreReader;
pub use store::sink::{BlockSink, SyncStore};
