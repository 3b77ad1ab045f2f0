//! Channel-name grammar and correlation-id allocation.
//!
//! All derived channel names hang off the endpoint's base channel:
//!
//! ```text
//! <service_channel>/req
//! <service_channel>/rsp/<id>
//! <action_channel>/goal
//! <action_channel>/cancel
//! <action_channel>/fb/<goal_id>
//! <action_channel>/res/<goal_id>
//! ```

use crate::error::{self, Error};
use snafu::ensure;
use std::sync::atomic::{AtomicU64, Ordering};

/// Upper bound on client names embedded in correlation ids.
pub const MAX_CLIENT_NAME_LEN: usize = 16;

/// Upper bound on base channel names, as typically imposed by the bus.
pub const MAX_CHANNEL_LEN: usize = 63;

/// Request channel of a service.
pub fn service_request(channel: &str) -> String {
    format!("{}/req", channel)
}

/// Per-request response channel of a service.
pub fn service_response(channel: &str, id: &str) -> String {
    format!("{}/rsp/{}", channel, id)
}

/// Goal channel of an action.
pub fn action_goal(channel: &str) -> String {
    format!("{}/goal", channel)
}

/// Cancel channel of an action.
pub fn action_cancel(channel: &str) -> String {
    format!("{}/cancel", channel)
}

/// Per-goal feedback channel of an action.
pub fn action_feedback(channel: &str, goal_id: &str) -> String {
    format!("{}/fb/{}", channel, goal_id)
}

/// Per-goal result channel of an action.
pub fn action_result(channel: &str, goal_id: &str) -> String {
    format!("{}/res/{}", channel, goal_id)
}

pub(crate) fn validate_channel(channel: &str) -> Result<(), Error> {
    ensure!(
        !channel.is_empty(),
        error::InvalidChannel {
            channel,
            reason: "channel cannot be empty",
        }
    );
    ensure!(
        channel.len() <= MAX_CHANNEL_LEN,
        error::InvalidChannel {
            channel,
            reason: format!("channel exceeds {} characters", MAX_CHANNEL_LEN),
        }
    );
    Ok(())
}

pub(crate) fn validate_client_name(name: &str) -> Result<(), Error> {
    ensure!(
        !name.is_empty(),
        error::InvalidClientName {
            name,
            reason: "client name cannot be empty",
        }
    );
    ensure!(
        name.len() <= MAX_CLIENT_NAME_LEN,
        error::InvalidClientName {
            name,
            reason: format!(
                "client name must be {} characters or less, got {}",
                MAX_CLIENT_NAME_LEN,
                name.len()
            ),
        }
    );
    // ids derived from the name end up inside channel names
    ensure!(
        name.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'),
        error::InvalidClientName {
            name,
            reason: "client name may only contain ascii alphanumerics, '_' and '-'",
        }
    );
    Ok(())
}

/// Allocates `<client_name>_<counter>` correlation ids for one endpoint,
/// counting from 1.
#[derive(Debug)]
pub(crate) struct IdAllocator {
    name: String,
    counter: AtomicU64,
}

impl IdAllocator {
    /// New allocator for the given client name, or an auto-generated
    /// `<prefix>_<5 hex>` name when none is supplied.
    pub fn new(name: Option<&str>, prefix: &str) -> Result<Self, Error> {
        let name = match name {
            Some(name) => {
                validate_client_name(name)?;
                name.to_string()
            }
            None => auto_name(prefix),
        };
        Ok(Self {
            name,
            counter: AtomicU64::new(0),
        })
    }

    pub fn client_name(&self) -> &str {
        &self.name
    }

    pub fn next(&self) -> String {
        let count = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}_{}", self.name, count)
    }
}

fn auto_name(prefix: &str) -> String {
    let uuid = uuid::Uuid::new_v4().to_simple().to_string();
    format!("{}_{}", prefix, &uuid[.. 5])
}
