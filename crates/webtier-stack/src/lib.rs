//! webtier-stack: turns a validated `StackSpec` into provisioned resources.
//!
//! ```text
//! StackSpec
//!   ├── validate()            → DefinitionError, before any backend call
//!   ├── plan()                → ordered PlannedResource list
//!   ├── apply()               → create_or_update per resource via ProvisioningBackend
//!   └── OutputPublisher       → waits for the load balancer, publishes `albDNS`
//! ```

pub mod apply;
pub mod error;
pub mod outputs;

pub use apply::{ApplyReport, PlannedResource, apply, plan};
pub use error::{StackError, StackResult};
pub use outputs::{ALB_DNS_OUTPUT, OutputPublisher};
