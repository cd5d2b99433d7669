//! HTTP routing for the plugin endpoints.
//!
//! ```text
//! /Plugin.Activate         - handshake, static capability manifest
//! /VolumeDriver.Create     - VolumeDriver::create
//! /VolumeDriver.Remove     - VolumeDriver::remove
//! /VolumeDriver.Path       - VolumeDriver::path
//! /VolumeDriver.Mount      - VolumeDriver::mount
//! /VolumeDriver.Umount     - VolumeDriver::umount
//! ```
//!
//! Endpoints accept any method. Unknown paths get a 404 from the router.

use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use tracing::{debug, warn};

use crate::codec::{self, IMPLEMENTATION_MANIFEST};
use crate::driver::VolumeDriver;
use crate::types::{Action, VolumeResponse};

/// Path of the handshake endpoint.
pub const ACTIVATE_ENDPOINT: &str = "/Plugin.Activate";

/// State shared by every action endpoint. Read-only once built.
struct ActionState<D: ?Sized> {
    root: String,
    driver: Arc<D>,
}

/// Build the router serving the handshake and the five driver actions.
///
/// `root` replaces whatever `Root` the client sent before the request
/// reaches the driver.
pub fn router<D>(root: impl Into<String>, driver: Arc<D>) -> Router
where
    D: VolumeDriver + ?Sized,
{
    let state = Arc::new(ActionState {
        root: root.into(),
        driver,
    });

    let mut router = Router::new().route(ACTIVATE_ENDPOINT, any(activate));
    for action in Action::ALL {
        let state = Arc::clone(&state);
        router = router.route(
            action.endpoint(),
            any(move |body: Bytes| handle_action(action, Arc::clone(&state), body)),
        );
    }
    router
}

/// Handshake: advertise the volume driver capability.
async fn activate() -> Response {
    codec::plugin_reply(StatusCode::OK, IMPLEMENTATION_MANIFEST)
}

async fn handle_action<D>(action: Action, state: Arc<ActionState<D>>, body: Bytes) -> Response
where
    D: VolumeDriver + ?Sized,
{
    let mut req = match codec::decode_request(&body) {
        Ok(req) => req,
        Err(e) => {
            debug!(%action, error = %e, "malformed volume request");
            return e.into_response();
        }
    };
    req.root.clone_from(&state.root);

    let volume = req.name.clone();
    let driver = Arc::clone(&state.driver);
    let res = match tokio::task::spawn_blocking(move || action.dispatch(&*driver, req)).await {
        Ok(res) => res,
        Err(e) => {
            warn!(%action, volume, error = %e, "volume driver task failed");
            VolumeResponse::error(format!("volume driver {action} failed: {e}"))
        }
    };

    debug!(%action, volume, failed = res.is_error(), "volume request handled");
    res.into_response()
}
