use actix_cors::Cors;
use actix_web::http::header;
use actix_web::web::{Data, scope};
use actix_web::{App, HttpServer};
use dotenv::dotenv;
use tracing_log::log::info;

use bugtrap::auth::AuthMiddleware;
use bugtrap::configuration::get_configuration;
use bugtrap::db::init_db;
use bugtrap::migration::{Migrator, MigratorTrait};
use bugtrap::storage::BlobStore;
use bugtrap::telemetry::{get_subscriber, init_subscriber};
use bugtrap::api;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = get_subscriber("bugtrap".into(), "info,sqlx=warn".into(), std::io::stdout);
    init_subscriber(subscriber);

    dotenv().ok();
    let settings = get_configuration()?;

    let db = init_db(&settings.database_url).await?;
    info!("running database migrations");
    Migrator::up(&db, None).await?;
    info!("migrations complete");

    let db_data = Data::new(db);
    let store_data = Data::new(BlobStore::new(&settings.upload_dir));

    info!("starting server on {}:{}", settings.host, settings.port);
    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers(vec![header::CONTENT_TYPE, header::AUTHORIZATION])
            .max_age(3600);

        App::new()
            .wrap(cors)
            .app_data(db_data.clone())
            .app_data(store_data.clone())
            .service(api::health_check::health_check)
            .service(api::login)
            .service(api::logout)
            .service(api::refresh_token)
            .service(
                scope("")
                    .wrap(AuthMiddleware)
                    // fixed user paths have to land before /users/{id}
                    .service(api::get_profile)
                    .service(api::update_profile)
                    .service(api::upload_avatar)
                    .service(api::change_password)
                    .service(api::list_developers)
                    .service(api::list_users)
                    .service(api::create_user)
                    .service(api::reset_password)
                    .service(api::toggle_status)
                    .service(api::get_user)
                    .service(api::update_user)
                    .service(api::delete_user)
                    .service(api::module_cascade)
                    .service(api::list_projects)
                    .service(api::create_project)
                    .service(api::get_project)
                    .service(api::update_project)
                    .service(api::delete_project)
                    .service(api::list_products)
                    .service(api::create_product)
                    .service(api::get_product)
                    .service(api::update_product)
                    .service(api::delete_product)
                    .service(api::list_modules)
                    .service(api::create_module)
                    .service(api::get_module)
                    .service(api::update_module)
                    .service(api::delete_module)
                    .service(api::list_bugs)
                    .service(api::create_bug)
                    .service(api::update_bug_status)
                    .service(api::assign_bug)
                    .service(api::upload_attachment)
                    .service(api::delete_attachment)
                    .service(api::copy_bug)
                    .service(api::get_bug)
                    .service(api::update_bug)
                    .service(api::delete_bug),
            )
    })
    .bind((settings.host.as_str(), settings.port))?
    .run()
    .await?;

    Ok(())
}
