//! API layer - HTTP endpoint handlers organized by domain.

mod broadcast;
mod clients;
mod health;
mod metrics;
mod routes;
mod stream;
mod time;

pub use broadcast::{broadcast, send_to_client, AcceptedResponse};
pub use clients::{clients, ClientDetail, ClientsSnapshot, ClientsUpdate};
pub use health::{health, HealthResponse};
pub use metrics::prometheus_metrics;
pub use routes::{api_routes, stream_routes};
pub use stream::{push_every, wants_upgrade};
pub use time::{time, CurrentTime, TimeUpdate};
