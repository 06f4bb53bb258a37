pub mod config;
pub mod control;
pub mod engine;
pub mod event_bus;
pub mod http_client;
pub mod runtime_context;

pub use config::{EngineConfig, HttpPoolConfig};
pub use control::{ControlState, ExecutionControl};
pub use engine::{apply_parameter_defaults, check_servers, ExecutionOptions, ScenarioEngine};
pub use event_bus::{
    create_event_channel, ChannelObserver, CollectingObserver, EventReceiver, EventSender,
    ExecutionCallbacks, ExecutionEvent, ExecutionObserver, FanoutObserver, LogEntry, LogLevel,
    NoopObserver,
};
pub use http_client::{HttpRequestSender, RequestSender};
pub use runtime_context::{
    FakeIdGenerator, FakeTimeProvider, IdGenerator, RealIdGenerator, RealTimeProvider,
    RuntimeContext, TimeProvider,
};
