use crate::db::{DbPool, OrmConn};
use crate::services::payment_service::StripeClient;

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub orm: OrmConn,
    pub stripe: StripeClient,
}
