//! # Route Groups
//!
//! The gateway's route table, one group per backend domain. Every chain ends with a
//! [`ReverseProxyForward`] to the group's backend.
//!
//! | Group     | Backend   |
//! |-----------|-----------|
//! | Users     | users     |
//! | Admin     | users, trainings, metrics |
//! | Trainings | trainings |
//! | Reviews   | trainings |
//! | Goals     | goals     |
//! | Metrics   | metrics   |

use axum::http::Method;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::auth::{
    AccountCreate, AdminCreate, AdminElevationChecker, AuthService, BlockStatusUpdate,
    TokenAuthenticator,
};
use crate::core::config::{BackendTargets, GatewayConfig};
use crate::core::error::GatewayResult;
use crate::core::types::BackendTarget;
use crate::middleware::{
    is_authorized, ConditionalBranch, Handler, PathAppendUid, PathStripPrefix, PipelineBuilder,
    QueryInject,
};
use crate::proxy::{ProxyClient, ReverseProxyForward};
use crate::routing::router::{RouteTable, RouteTableBuilder};

const ADMIN_PREFIX: &str = "/admins";

/// Everything the handler chains depend on
#[derive(Clone)]
pub struct RouteDependencies {
    pub auth: Arc<dyn AuthService>,
    pub backends: BackendTargets,
    pub client: ProxyClient,
    pub upstream_timeout: Duration,
    pub auth_timeout: Duration,
    pub max_body_size: usize,
}

impl RouteDependencies {
    pub fn from_config(
        config: &GatewayConfig,
        auth: Arc<dyn AuthService>,
        client: ProxyClient,
    ) -> Self {
        Self {
            auth,
            backends: config.backend_targets(),
            client,
            upstream_timeout: config.server.upstream_timeout,
            auth_timeout: config.server.auth_timeout,
            max_body_size: config.server.max_body_size,
        }
    }

    fn require(&self) -> TokenAuthenticator {
        TokenAuthenticator::require(self.auth.clone())
    }

    fn probe(&self) -> TokenAuthenticator {
        TokenAuthenticator::probe(self.auth.clone())
    }

    fn admin_check(&self) -> GatewayResult<AdminElevationChecker> {
        AdminElevationChecker::new(self.backends.users.clone(), self.auth_timeout)
    }

    fn forward(&self, target: &Arc<BackendTarget>) -> ReverseProxyForward {
        ReverseProxyForward::new(target.clone(), self.client.clone(), self.upstream_timeout)
    }
}

/// Registers the routes of one domain against one backend
struct RouteGroup<'a> {
    name: &'static str,
    table: &'a mut RouteTableBuilder,
    deps: &'a RouteDependencies,
    target: Arc<BackendTarget>,
    count: usize,
}

impl<'a> RouteGroup<'a> {
    fn new(
        name: &'static str,
        table: &'a mut RouteTableBuilder,
        deps: &'a RouteDependencies,
        target: &Arc<BackendTarget>,
    ) -> Self {
        Self {
            name,
            table,
            deps,
            target: target.clone(),
            count: 0,
        }
    }

    /// Register a chain; the forwarder to this group's backend is appended
    fn route(
        &mut self,
        method: Method,
        pattern: &str,
        chain: PipelineBuilder,
    ) -> GatewayResult<&mut Self> {
        let target = self.target.clone();
        self.route_to(&target, method, pattern, chain)
    }

    /// Register a chain forwarding to another backend than the group's
    fn route_to(
        &mut self,
        target: &Arc<BackendTarget>,
        method: Method,
        pattern: &str,
        chain: PipelineBuilder,
    ) -> GatewayResult<&mut Self> {
        let pipeline = chain.with(self.deps.forward(target)).build()?;
        self.table.add(method, pattern, pipeline)?;
        self.count += 1;
        Ok(self)
    }

    fn finish(self) {
        info!(
            group = self.name,
            backend = %self.target,
            routes = self.count,
            "Registered route group"
        );
    }
}

fn chain() -> PipelineBuilder {
    PipelineBuilder::new()
}

fn users_routes(table: &mut RouteTableBuilder, deps: &RouteDependencies) -> GatewayResult<()> {
    let mut group = RouteGroup::new("users", table, deps, &deps.backends.users);

    group
        .route(
            Method::POST,
            "/users",
            chain().with(AccountCreate::new(deps.auth.clone(), deps.max_body_size)),
        )?
        .route(
            Method::GET,
            "/users",
            chain().with(deps.probe()).with(ConditionalBranch::new(
                is_authorized(),
                PathAppendUid,
                QueryInject::new("admin", "false"),
            )),
        )?
        .route(Method::GET, "/users/:user_id", chain().with(deps.require()))?
        .route(Method::PUT, "/users/:user_id", chain().with(deps.require()))?;

    group.finish();
    Ok(())
}

fn admin_routes(table: &mut RouteTableBuilder, deps: &RouteDependencies) -> GatewayResult<()> {
    let admin_check: Arc<dyn Handler> = Arc::new(deps.admin_check()?);
    let admin = || chain().with(deps.require()).with_shared(admin_check.clone());
    let admin_view = |chain: PipelineBuilder| {
        chain
            .with(PathStripPrefix::new(ADMIN_PREFIX))
            .with(QueryInject::new("admin", "true"))
    };

    let trainings = deps.backends.trainings.clone();
    let metrics = deps.backends.metrics.clone();
    let mut group = RouteGroup::new("admin", table, deps, &deps.backends.users);

    group
        .route(
            Method::POST,
            "/admins",
            admin().with(AdminCreate::new(deps.auth.clone(), deps.max_body_size)),
        )?
        .route(Method::GET, "/admins/users", admin_view(admin()))?
        .route(Method::GET, "/admins/users/:user_id", admin_view(admin()))?
        .route(
            Method::PATCH,
            "/admins/users",
            admin_view(admin().with(BlockStatusUpdate::new(
                deps.auth.clone(),
                deps.max_body_size,
            ))),
        )?
        .route_to(&trainings, Method::GET, "/admins/plans", admin_view(admin()))?
        .route_to(
            &trainings,
            Method::PATCH,
            "/admins/plans/:plan_id",
            admin_view(admin()),
        )?
        .route_to(&metrics, Method::GET, "/admins/metrics", admin_view(admin()))?
        .route_to(
            &metrics,
            Method::GET,
            "/admins/metrics/*rest",
            admin_view(admin()),
        )?;

    group.finish();
    Ok(())
}

fn trainings_routes(table: &mut RouteTableBuilder, deps: &RouteDependencies) -> GatewayResult<()> {
    let mut group = RouteGroup::new("trainings", table, deps, &deps.backends.trainings);

    group
        .route(Method::POST, "/plans", chain().with(deps.require()))?
        .route(Method::GET, "/plans", chain().with(deps.require()))?
        .route(Method::GET, "/plans/:plan_id", chain().with(deps.require()))?
        .route(Method::PUT, "/plans/:plan_id", chain().with(deps.require()))?
        .route(Method::DELETE, "/plans/:plan_id", chain().with(deps.require()))?
        .route(
            Method::GET,
            "/trainings/favourites",
            chain().with(deps.require()).with(PathAppendUid),
        )?
        .route(
            Method::POST,
            "/trainings/favourites",
            chain().with(deps.require()).with(PathAppendUid),
        )?
        .route(
            Method::DELETE,
            "/trainings/favourites/:plan_id",
            chain().with(deps.require()).with(PathAppendUid),
        )?;

    group.finish();
    Ok(())
}

fn reviews_routes(table: &mut RouteTableBuilder, deps: &RouteDependencies) -> GatewayResult<()> {
    let mut group = RouteGroup::new("reviews", table, deps, &deps.backends.trainings);

    group
        .route(Method::POST, "/reviews", chain().with(deps.require()))?
        .route(Method::GET, "/plans/:plan_id/reviews", chain().with(deps.require()))?
        .route(Method::PUT, "/reviews/:review_id", chain().with(deps.require()))?
        .route(Method::DELETE, "/reviews/:review_id", chain().with(deps.require()))?;

    group.finish();
    Ok(())
}

fn goals_routes(table: &mut RouteTableBuilder, deps: &RouteDependencies) -> GatewayResult<()> {
    let mut group = RouteGroup::new("goals", table, deps, &deps.backends.goals);

    group
        .route(Method::POST, "/goals", chain().with(deps.require()))?
        .route(Method::GET, "/goals", chain().with(deps.require()).with(PathAppendUid))?
        .route(Method::GET, "/goals/:goal_id", chain().with(deps.require()))?
        .route(Method::PUT, "/goals/:goal_id", chain().with(deps.require()))?
        .route(Method::DELETE, "/goals/:goal_id", chain().with(deps.require()))?;

    group.finish();
    Ok(())
}

fn metrics_routes(table: &mut RouteTableBuilder, deps: &RouteDependencies) -> GatewayResult<()> {
    let mut group = RouteGroup::new("metrics", table, deps, &deps.backends.metrics);

    group
        .route(Method::POST, "/metrics", chain().with(deps.require()).with(PathAppendUid))?
        .route(Method::GET, "/metrics", chain().with(deps.require()).with(PathAppendUid))?;

    group.finish();
    Ok(())
}

/// Build the full route table from every domain group
pub fn build_route_table(deps: &RouteDependencies) -> GatewayResult<RouteTable> {
    let mut table = RouteTable::builder();

    users_routes(&mut table, deps)?;
    admin_routes(&mut table, deps)?;
    trainings_routes(&mut table, deps)?;
    reviews_routes(&mut table, deps)?;
    goals_routes(&mut table, deps)?;
    metrics_routes(&mut table, deps)?;

    let table = table.build()?;
    info!(routes = table.len(), "Route table built");
    Ok(table)
}
