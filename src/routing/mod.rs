pub mod router;
pub mod routes;

pub use router::{RouteMatch, RouteTable, RouteTableBuilder};
pub use routes::{build_route_table, RouteDependencies};
