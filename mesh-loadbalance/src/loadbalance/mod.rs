pub mod poller;
pub mod probe;
pub mod registry;
pub mod scorer;
pub mod selector;
pub mod service;
pub mod traits;


pub use poller::{MetricsPoller, PollerHandle, TickReport};
pub use probe::{MetricsProbe, ProbeError, RpcMetricsProbe, GET_METRICS_METHOD, HEALTH_SERVICE};
pub use registry::{
    Instance, InstanceHealth, InstanceSnapshot, Metrics, Registry, RegistryError,
    RegistrySnapshot, ServiceEntry, ServiceSnapshot,
};
pub use scorer::score;
pub use selector::{InstanceSelector, SelectedInstance, SelectionError};
pub use service::{HealthSummary, LoadBalanceService};
pub use traits::LoadBalancer;
