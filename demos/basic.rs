//! Basic example of the Sanduq DI container.

use std::sync::Arc;

use sanduq::logging::init_tracing;
use sanduq::prelude::*;
use tracing::info;

// === Define your traits and types ===

trait Logger: Send + Sync {
    fn log(&self, msg: &str);
}

struct ConsoleLogger;

impl Logger for ConsoleLogger {
    fn log(&self, msg: &str) {
        println!("[LOG] {msg}");
    }
}

struct Config {
    database_url: String,
    debug: bool,
}

struct Database {
    url: String,
    logger: Arc<dyn Logger>,
}

impl Database {
    fn query(&self, sql: &str) -> String {
        self.logger.log(&format!("Executing: {sql}"));
        format!("Results from {}", self.url)
    }
}

impl Disposable for Database {
    fn dispose(&self) {
        self.logger.log("Closing database connection");
    }
}

impl Injectable for Database {
    fn construct() -> Result<Arc<Self>> {
        let config: Arc<Config> = inject(&Token::of())?;
        Ok(Arc::new(Database {
            url: config.database_url.clone(),
            logger: inject(&Token::of())?,
        }))
    }

    fn metadata(meta: &mut ClassMetadata<Self>) {
        meta.scope(Scope::Container).disposable();
    }
}

struct UserRepository {
    db: Arc<Database>,
}

impl UserRepository {
    fn find_user(&self, id: u64) -> String {
        self.db.query(&format!("SELECT * FROM users WHERE id = {id}"))
    }
}

impl Injectable for UserRepository {
    fn construct() -> Result<Arc<Self>> {
        Ok(Arc::new(UserRepository {
            db: inject(&Token::class())?,
        }))
    }
}

struct UserService {
    repo: Arc<UserRepository>,
    logger: Arc<dyn Logger>,
}

impl UserService {
    fn get_user(&self, id: u64) -> String {
        self.logger.log(&format!("Getting user {id}"));
        self.repo.find_user(id)
    }
}

impl Injectable for UserService {
    fn construct() -> Result<Arc<Self>> {
        Ok(Arc::new(UserService {
            repo: inject(&Token::class())?,
            logger: inject(&Token::of())?,
        }))
    }
}

fn main() -> Result<()> {
    init_tracing("sanduq=debug");

    // === Build the container ===

    let container = Container::new();
    container.register(
        &Token::<Config>::of(),
        Provider::value(Config {
            database_url: "postgres://localhost/myapp".to_string(),
            debug: true,
        }),
    )?;
    container.register_with(
        &Token::<dyn Logger>::of(),
        Provider::factory_arc(|| Ok(Arc::new(ConsoleLogger) as Arc<dyn Logger>)),
        Scope::Container,
    )?;
    container.register_class::<Database>()?;

    // === Resolve ===

    let service = container.resolve(&Token::<UserService>::class())?;
    let result = service.get_user(42);
    info!(%result, "Resolved UserService");

    let config = container.resolve(&Token::<Config>::of())?;
    info!(debug = config.debug, "Config loaded");

    // Container scope: the same database everywhere.
    let db1 = container.resolve(&Token::<Database>::class())?;
    let db2 = container.resolve(&Token::<Database>::class())?;
    info!(same = Arc::ptr_eq(&db1, &db2), "Database is container-scoped");

    // === Child container for a request ===

    let request = container.create_child()?;
    request.register(
        &Token::<dyn Logger>::of(),
        Provider::factory_arc(|| Ok(Arc::new(ConsoleLogger) as Arc<dyn Logger>)),
    )?;
    let scoped = request.resolve(&Token::<UserService>::class())?;
    info!(
        shared_db = Arc::ptr_eq(&scoped.repo.db, &db1),
        "Request container reuses the root database"
    );

    // === Teardown ===

    container.dispose();
    info!(disposed = request.is_disposed(), "Container disposed");
    Ok(())
}
