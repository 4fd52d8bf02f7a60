use warp::Filter;

use chatnet::api::{self, ApiContext};
use chatnet::auth::UserDirectory;
use chatnet::config::Config;
use chatnet::registry::SessionRegistry;
use chatnet::rooms::RoomStore;
use chatnet::router::ChatRouter;
use chatnet::server::Gateway;

#[tokio::main]
async fn main() {
    env_logger::init();

    let config = Config::from_env();

    let users = UserDirectory::new();
    users.seed_admin().await;

    let rooms = RoomStore::new();
    rooms.seed_defaults().await;

    let registry = SessionRegistry::new();
    let router = ChatRouter::new(rooms.clone(), registry.clone(), users.clone());
    let gateway = Gateway::new(router.clone(), registry, users.clone());

    let ctx = ApiContext {
        users,
        rooms,
        router,
        jwt_secret: config.jwt_secret.clone(),
        token_ttl_hours: config.token_ttl_hours,
    };

    let cors = warp::cors()
        .allow_any_origin()
        .allow_headers(["content-type", "authorization"])
        .allow_methods(["GET", "POST", "PUT", "DELETE", "OPTIONS"]);

    let routes = gateway
        .route(config.jwt_secret.clone())
        .or(api::routes(ctx))
        .recover(api::handle_rejection)
        .with(cors);

    log::info!("server starting on port {}", config.port);
    warp::serve(routes).run(([0, 0, 0, 0], config.port)).await;
}
