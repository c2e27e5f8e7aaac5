/**
 * port module
 * Port pool ranges and best-effort free port allocation
 */

pub mod allocator;
pub mod connections;
pub mod range;

pub use allocator::PortAllocator;
pub use connections::{parse_proc_net_tcp, ConnectionTable, StaticConnectionTable, SystemConnectionTable};
pub use range::PortPoolRange;
