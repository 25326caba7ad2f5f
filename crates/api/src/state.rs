//! Shared application state.

use std::sync::Arc;

use domain::{
    AuthService, CartService, Catalog, CategoryService, OrderWorkflow, ReviewService,
    TokenIssuer, UserService,
};
use gateways::{Cache, Mailer, PaymentGateway};
use secrecy::ExposeSecret;
use store::DocumentStore;

use crate::config::Config;

/// External services the application talks to.
#[derive(Clone)]
pub struct Gateways {
    pub cache: Arc<dyn Cache>,
    pub mailer: Arc<dyn Mailer>,
    pub payments: Arc<dyn PaymentGateway>,
}

/// Shared application state accessible from all handlers.
pub struct AppState<S> {
    pub auth: AuthService<S>,
    pub users: UserService<S>,
    pub categories: CategoryService<S>,
    pub catalog: Catalog<S>,
    pub carts: CartService<S>,
    pub orders: OrderWorkflow<S>,
    pub reviews: ReviewService<S>,
    pub cache: Arc<dyn Cache>,
}

impl<S: DocumentStore + Clone + 'static> AppState<S> {
    /// Wires every service over one store.
    pub fn new(store: S, config: &Config, gateways: Gateways) -> Self {
        let access = TokenIssuer::new(
            config.jwt_secret.expose_secret().as_bytes(),
            config.jwt_expires_in,
        );
        let email_tokens = TokenIssuer::new(
            config.jwt_email_secret.expose_secret().as_bytes(),
            config.jwt_email_expires_in,
        );
        let catalog = Catalog::new(store.clone(), gateways.cache.clone());

        Self {
            auth: AuthService::new(
                store.clone(),
                access,
                email_tokens,
                gateways.mailer,
                config.app_url.clone(),
            ),
            users: UserService::new(store.clone()),
            categories: CategoryService::new(store.clone()),
            carts: CartService::new(store.clone(), catalog.clone()),
            orders: OrderWorkflow::new(
                store.clone(),
                catalog.clone(),
                gateways.payments,
                config.frontend_url.clone(),
            ),
            reviews: ReviewService::new(store, catalog.clone()),
            catalog,
            cache: gateways.cache,
        }
    }
}
