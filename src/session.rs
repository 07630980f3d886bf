// Session management: connect, list groups, switch the active group, post
// ROIs and close. The traits at the top are what the import and the
// interactive flow depend on, so both can run against an in-memory session.

use crate::api::{select_server, ApiClient, EventContext};
use crate::config::Config;
use crate::shapes::{roi_payload, Shape};
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Anything ROIs can be posted to.
pub trait RoiTarget {
    /// Attach `shape` to the image `image_id`; returns the new ROI id.
    fn post_roi(&self, image_id: i64, shape: &Shape) -> Result<i64>;
}

/// An authenticated session scoped to one group at a time.
pub trait GroupSession: RoiTarget {
    fn list_groups(&self) -> Result<Groups>;
    /// Rebind the active group. Membership is not checked here.
    fn switch_group(&mut self, group_id: i64) -> Result<()>;
    /// Release the session. Calling it more than once has no further effect.
    fn close(&mut self);
}

pub trait Connector {
    type Session: GroupSession;
    fn connect(&self, host: &str, username: &str, password: &str) -> Result<Self::Session>;
}

/// Groups the user belongs to, keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Groups(BTreeMap<i64, String>);

impl Groups {
    pub fn new(groups: impl IntoIterator<Item = (i64, String)>) -> Self {
        Groups(groups.into_iter().collect())
    }

    pub fn contains(&self, group_id: i64) -> bool {
        self.0.contains_key(&group_id)
    }

    pub fn name(&self, group_id: i64) -> Option<&str> {
        self.0.get(&group_id).map(String::as_str)
    }

    /// One `ID: <id> - <name>` line per group.
    pub fn listing(&self) -> String {
        self.0
            .iter()
            .map(|(id, name)| format!("ID: {id} - {name}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Background heartbeat that pings the server until dropped.
struct KeepAlive {
    stop: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl KeepAlive {
    fn start(api: ApiClient, interval: Duration) -> Self {
        let (stop, stopped) = mpsc::channel::<()>();
        let handle = thread::spawn(move || loop {
            match stopped.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {
                    if let Err(e) = api.keepalive_ping() {
                        tracing::warn!("keep-alive ping failed: {e:#}");
                    }
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        });
        KeepAlive {
            stop,
            handle: Some(handle),
        }
    }
}

impl Drop for KeepAlive {
    fn drop(&mut self) {
        let _ = self.stop.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Live session against an OMERO.web server.
pub struct OmeroSession {
    api: ApiClient,
    context: EventContext,
    active_group: i64,
    keep_alive: Option<KeepAlive>,
    closed: bool,
}

impl RoiTarget for OmeroSession {
    fn post_roi(&self, image_id: i64, shape: &Shape) -> Result<i64> {
        let saved = self
            .api
            .save(self.active_group, &roi_payload(image_id, shape))?;
        saved
            .get("@id")
            .and_then(|id| id.as_i64())
            .context("Save response did not include the ROI id")
    }
}

impl GroupSession for OmeroSession {
    fn list_groups(&self) -> Result<Groups> {
        let groups = self.api.experimenter_groups(self.context.user_id)?;
        Ok(Groups::new(groups.into_iter().map(|g| (g.id, g.name))))
    }

    fn switch_group(&mut self, group_id: i64) -> Result<()> {
        self.active_group = group_id;
        tracing::info!("Successfully switched to group with ID {group_id}.");
        Ok(())
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        // Stop the heartbeat before logging out.
        self.keep_alive.take();
        match self.api.logout() {
            Ok(()) => tracing::info!("session for {} closed", self.context.user_name),
            Err(e) => tracing::warn!("closing session failed: {e:#}"),
        }
    }
}

impl Drop for OmeroSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Opens `OmeroSession`s using the built-in settings.
pub struct OmeroConnector {
    config: Config,
}

impl OmeroConnector {
    pub fn new(config: Config) -> Self {
        OmeroConnector { config }
    }
}

impl Connector for OmeroConnector {
    type Session = OmeroSession;

    fn connect(&self, host: &str, username: &str, password: &str) -> Result<OmeroSession> {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.set_message(format!("Connecting to {host}..."));
        spinner.enable_steady_tick(Duration::from_millis(100));

        let result = open_session(host, username, password, &self.config);
        spinner.finish_and_clear();
        let session = result.context("Failed to connect to the OMERO server")?;
        tracing::info!(
            "connected to {} as {} (group {})",
            session.api.base_url(),
            session.context.user_name,
            session.active_group
        );
        Ok(session)
    }
}

fn open_session(host: &str, username: &str, password: &str, config: &Config) -> Result<OmeroSession> {
    let mut api = ApiClient::new(host)?;
    api.fetch_csrf_token()?;
    let servers = api.servers()?;
    let server = select_server(&servers)
        .with_context(|| format!("{} does not offer any server", api.base_url()))?;
    let context = api.login(server.id, username, password)?;
    let keep_alive = KeepAlive::start(api.clone(), config.keep_alive);
    Ok(OmeroSession {
        active_group: context.group_id,
        api,
        context,
        keep_alive: Some(keep_alive),
        closed: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_formats_one_line_per_group() {
        let groups = Groups::new([(7, "imaging".to_string()), (3, "lab".to_string())]);
        assert_eq!(groups.listing(), "ID: 3 - lab\nID: 7 - imaging");
        assert!(groups.contains(7));
        assert!(!groups.contains(4));
        assert_eq!(groups.name(3), Some("lab"));
    }

    #[test]
    fn empty_groups_have_empty_listing() {
        let groups = Groups::default();
        assert_eq!(groups.listing(), "");
        assert_eq!(groups.name(3), None);
    }
}
