use serde::Serialize;
use snapbooth_core::{BoothHandle, BoothState, BoothStatus};
use zbus::interface;

pub const BUS_NAME: &str = "org.snapbooth.Booth1";
pub const OBJECT_PATH: &str = "/org/snapbooth/Booth1";

#[derive(Serialize)]
struct StatusReport<'a> {
    version: &'static str,
    #[serde(flatten)]
    status: &'a BoothStatus,
}

fn status_json(status: &BoothStatus) -> Result<String, serde_json::Error> {
    serde_json::to_string(&StatusReport {
        version: env!("CARGO_PKG_VERSION"),
        status,
    })
}

/// D-Bus interface for the booth daemon.
///
/// Bus name: org.snapbooth.Booth1
/// Object path: /org/snapbooth/Booth1
pub struct BoothService {
    booth: BoothHandle,
}

impl BoothService {
    pub fn new(booth: BoothHandle) -> Self {
        Self { booth }
    }
}

#[interface(name = "org.snapbooth.Booth1")]
impl BoothService {
    /// Leave the result screen early. Returns false when no result is
    /// showing, in which case nothing happens.
    async fn take_another(&self) -> zbus::fdo::Result<bool> {
        let state = self.booth.status().state;
        if state != BoothState::ShowingResult {
            tracing::debug!(%state, "take_another ignored");
            return Ok(false);
        }
        tracing::info!("take_another requested");
        self.booth
            .take_another()
            .await
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;
        Ok(true)
    }

    /// Current booth status as JSON.
    async fn status(&self) -> zbus::fdo::Result<String> {
        status_json(&self.booth.status()).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }
}
