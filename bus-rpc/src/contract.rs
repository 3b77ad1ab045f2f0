//! Structural validation of endpoint type parameters.
//!
//! The trait bounds on each endpoint already enforce the message contract at
//! compile time for hand-written types. This module keeps the runtime
//! validation path for generated types whose invariants the compiler cannot
//! see: a probe instance must survive an encode/decode round trip, and an
//! action result must expose at least one terminal block. Successful checks
//! are memoized per `(channel, type names)` tuple.

use crate::error::Error;
use crate::message::{
    ActionFeedback, ActionGoal, ActionResult, Message, ServiceRequest, ServiceResponse,
};
use crate::names;
use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::sync::Mutex;

static CHECKED: Lazy<Mutex<HashSet<(String, String)>>> = Lazy::new(Default::default);

fn already_checked(channel: &str, types: &str) -> bool {
    CHECKED
        .lock()
        .unwrap()
        .contains(&(channel.to_string(), types.to_string()))
}

fn remember(channel: &str, types: &str) {
    CHECKED
        .lock()
        .unwrap()
        .insert((channel.to_string(), types.to_string()));
}

fn contract_error<T: Message>(reason: String) -> Error {
    Error::TypeContract {
        type_name: T::TYPE_NAME.to_string(),
        reason,
    }
}

/// A default instance must survive the wire format.
fn probe_round_trip<T: Message + Default>() -> Result<(), Error> {
    let payload = T::default()
        .encode()
        .map_err(|error| contract_error::<T>(format!("default instance failed to encode: {}", error)))?;
    T::decode(&payload).map_err(|error| {
        contract_error::<T>(format!("encoded default instance failed to decode: {}", error))
    })?;
    Ok(())
}

pub(crate) fn verify_topic<T: Message>(channel: &str) -> Result<(), Error> {
    // encode/decode are enforced by the `Message` bound itself
    names::validate_channel(channel)
}

pub(crate) fn verify_service<Req, Resp>(channel: &str) -> Result<(), Error>
where
    Req: ServiceRequest,
    Resp: ServiceResponse,
{
    names::validate_channel(channel)?;
    let types = format!("{}+{}", Req::TYPE_NAME, Resp::TYPE_NAME);
    if already_checked(channel, &types) {
        return Ok(());
    }
    probe_round_trip::<Req>()?;
    probe_round_trip::<Resp>()?;
    remember(channel, &types);
    Ok(())
}

pub(crate) fn verify_action<G, F, R>(channel: &str) -> Result<(), Error>
where
    G: ActionGoal,
    F: ActionFeedback,
    R: ActionResult,
{
    names::validate_channel(channel)?;
    let types = format!("{}+{}+{}", G::TYPE_NAME, F::TYPE_NAME, R::TYPE_NAME);
    if already_checked(channel, &types) {
        return Ok(());
    }
    probe_round_trip::<G>()?;
    probe_round_trip::<F>()?;
    probe_round_trip::<R>()?;
    let probe = R::default();
    if probe.status().is_none() && probe.response_header().is_none() {
        return Err(contract_error::<R>(
            "result type must carry either a 'status' or a 'response_header' block".to_string(),
        ));
    }
    remember(channel, &types);
    Ok(())
}
