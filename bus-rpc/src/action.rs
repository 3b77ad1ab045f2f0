//! Long-running goal execution with streaming feedback, terminal results and
//! cooperative cancellation.
//!
//! A goal travels on `<channel>/goal`; its feedback and result come back on
//! per-goal channels (`<channel>/fb/<goal_id>`, `<channel>/res/<goal_id>`).
//! Cancellation is cooperative only: the server raises a flag the handler is
//! expected to poll, it never preempts a running worker.

use crate::contract;
use crate::error::{self, Error, GoalError};
use crate::message::{
    ActionCancel, ActionFeedback, ActionGoal, ActionResult, Correlated, GoalStatus, Message,
};
use crate::names::{self, IdAllocator};
use crate::runtime::{DispatchCallback, RegistrationId, Runtime};
use bus_api::{Bus, BusMessage, DynBus};
use futures::future::BoxFuture;
use snafu::{OptionExt, ResultExt};
use std::{
    collections::HashMap,
    future::Future,
    marker::PhantomData,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

type FeedbackCallback<F> = Arc<dyn Fn(F) + Send + Sync>;
type TerminalOutcome<R> = Result<R, Error>;

/// Client-side bookkeeping shared between a handle and the routing
/// callbacks.
struct HandleState<F, R> {
    goal_id: String,
    channel: String,
    status: Mutex<GoalStatus>,
    cancelled: AtomicBool,
    feedback_callbacks: Mutex<Vec<FeedbackCallback<F>>>,
    feedback_streams: Mutex<Vec<mpsc::UnboundedSender<F>>>,
    result_sender: Mutex<Option<oneshot::Sender<TerminalOutcome<R>>>>,
    result_receiver: Mutex<Option<oneshot::Receiver<TerminalOutcome<R>>>>,
}

impl<F: ActionFeedback, R: ActionResult> HandleState<F, R> {
    fn deliver_feedback(&self, feedback: F) {
        {
            let mut status = self.status.lock().unwrap();
            if *status == GoalStatus::Accepted {
                *status = GoalStatus::Executing;
            }
        }
        // clone the callback list out so user code never runs under the lock
        let callbacks: Vec<FeedbackCallback<F>> =
            self.feedback_callbacks.lock().unwrap().clone();
        for callback in callbacks {
            callback(feedback.clone());
        }
        let mut streams = self.feedback_streams.lock().unwrap();
        streams.retain(|sink| sink.send(feedback.clone()).is_ok());
    }

    fn complete(&self, outcome: TerminalOutcome<R>, status: GoalStatus) {
        *self.status.lock().unwrap() = status;
        if let Some(sender) = self.result_sender.lock().unwrap().take() {
            let _ = sender.send(outcome);
        }
        // terminal: end the pull-style feedback streams
        self.feedback_streams.lock().unwrap().clear();
    }
}

/// Handle tracking a single goal on the client side.
///
/// Status starts at `Accepted`, flips to `Executing` on the first feedback
/// and settles on the terminal status carried by the result.
pub struct ActionHandle<F, R> {
    state: Arc<HandleState<F, R>>,
    runtime: Runtime,
}

impl<F: ActionFeedback, R: ActionResult> ActionHandle<F, R> {
    /// The goal id allocated by `send_goal`.
    pub fn goal_id(&self) -> &str {
        &self.state.goal_id
    }

    /// Current status as observed by this client.
    pub fn status(&self) -> GoalStatus {
        *self.state.status.lock().unwrap()
    }

    /// Whether `cancel` has published a cancellation request.
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    /// Register a callback fired for every matching feedback, in
    /// registration order, on the dispatch worker. Keep them short.
    pub fn add_feedback_callback<C>(&self, callback: C)
    where
        C: Fn(F) + Send + Sync + 'static,
    {
        self.state
            .feedback_callbacks
            .lock()
            .unwrap()
            .push(Arc::new(callback));
    }

    /// Pull-style feedback stream fed by the same fan-out as the callbacks.
    /// The stream ends when the goal reaches a terminal state.
    pub fn feedback_stream(&self) -> mpsc::UnboundedReceiver<F> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.state.feedback_streams.lock().unwrap().push(sender);
        receiver
    }

    /// Request cooperative cancellation of the goal.
    ///
    /// Only meaningful while the goal is `Accepted` or `Executing`; repeated
    /// calls are no-ops and at most one cancel message is ever published.
    pub async fn cancel(&self) -> Result<(), Error> {
        {
            let status = *self.state.status.lock().unwrap();
            if !matches!(status, GoalStatus::Accepted | GoalStatus::Executing) {
                return Ok(());
            }
        }
        if self.state.cancelled.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let mut cancel = ActionCancel::default();
        cancel.goal_id = self.state.goal_id.clone();
        cancel.header.stamp(self.state.goal_id.as_str());
        let payload = cancel.encode()?;
        let channel = names::action_cancel(&self.state.channel);
        self.runtime
            .bus()
            .publish(&channel, &payload)
            .await
            .context(error::BusPublish { channel })?;
        info!("Sent cancel request for goal {}", self.state.goal_id);
        Ok(())
    }

    /// Wait for the terminal result, with no deadline.
    ///
    /// Succeeds only for a `Succeeded` goal; `Aborted` and `Canceled` goals
    /// fail with the status information. The result can be retrieved once.
    pub async fn get_result(&self) -> Result<R, Error> {
        let receiver = self.take_receiver()?;
        match receiver.await {
            Ok(outcome) => outcome,
            Err(_) => self.stopped_error(),
        }
    }

    /// Wait for the terminal result, failing once `timeout` elapses. After a
    /// timeout the result remains retrievable.
    pub async fn get_result_timeout(&self, timeout: Duration) -> Result<R, Error> {
        let mut receiver = self.take_receiver()?;
        match tokio::time::timeout(timeout, &mut receiver).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => self.stopped_error(),
            Err(_) => {
                *self.state.result_receiver.lock().unwrap() = Some(receiver);
                error::ResultTimeout {
                    goal_id: self.state.goal_id.clone(),
                    timeout,
                }
                .fail()
            }
        }
    }

    fn take_receiver(&self) -> Result<oneshot::Receiver<TerminalOutcome<R>>, Error> {
        self.state
            .result_receiver
            .lock()
            .unwrap()
            .take()
            .context(error::ResultConsumed {
                goal_id: self.state.goal_id.clone(),
            })
    }

    fn stopped_error(&self) -> Result<R, Error> {
        error::ClientStopped {
            channel: self.state.channel.clone(),
            id: self.state.goal_id.clone(),
        }
        .fail()
    }
}

struct ClientGoal<F, R> {
    state: Arc<HandleState<F, R>>,
    registrations: [RegistrationId; 2],
}

type GoalMap<F, R> = Arc<Mutex<HashMap<String, ClientGoal<F, R>>>>;

/// Typed client dispatching goals on a single action channel.
pub struct ActionClient<G, F, R> {
    runtime: Runtime,
    channel: String,
    ids: IdAllocator,
    goals: GoalMap<F, R>,
    goal_type: PhantomData<G>,
}

impl<G, F, R> ActionClient<G, F, R>
where
    G: ActionGoal,
    F: ActionFeedback,
    R: ActionResult,
{
    /// New client; types and arguments are validated once here.
    pub fn new(runtime: &Runtime, channel: &str, client_name: Option<&str>) -> Result<Self, Error> {
        contract::verify_action::<G, F, R>(channel)?;
        let ids = IdAllocator::new(client_name, "act")?;
        info!(
            "ActionClient '{}' created for '{}' with types {} -> {} -> {}",
            ids.client_name(),
            channel,
            G::TYPE_NAME,
            F::TYPE_NAME,
            R::TYPE_NAME
        );
        Ok(Self {
            runtime: runtime.clone(),
            channel: channel.to_string(),
            ids,
            goals: Default::default(),
            goal_type: PhantomData,
        })
    }

    /// The action channel this client dispatches on.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// The client name embedded in every goal id.
    pub fn client_name(&self) -> &str {
        self.ids.client_name()
    }

    /// Send a goal and return the handle tracking it, already subscribed to
    /// the goal's feedback and result channels. The caller's goal instance
    /// is left untouched.
    pub async fn send_goal(&self, goal: &G) -> Result<ActionHandle<F, R>, Error> {
        self.runtime.start_handler().await;

        let goal_id = self.ids.next();
        let mut goal = goal.clone();
        goal.header_mut().stamp(goal_id.as_str());

        let (sender, receiver) = oneshot::channel();
        let state = Arc::new(HandleState {
            goal_id: goal_id.clone(),
            channel: self.channel.clone(),
            status: Mutex::new(GoalStatus::Accepted),
            cancelled: AtomicBool::new(false),
            feedback_callbacks: Default::default(),
            feedback_streams: Default::default(),
            result_sender: Mutex::new(Some(sender)),
            result_receiver: Mutex::new(Some(receiver)),
        });

        let feedback_registration = self
            .runtime
            .register(
                &names::action_feedback(&self.channel, &goal_id),
                self.feedback_callback(),
            )
            .await?;
        let result_registration = match self
            .runtime
            .register(
                &names::action_result(&self.channel, &goal_id),
                self.result_callback(),
            )
            .await
        {
            Ok(registration) => registration,
            Err(err) => {
                self.runtime.unregister(feedback_registration);
                return Err(err);
            }
        };
        let registrations = [feedback_registration, result_registration];

        self.goals.lock().unwrap().insert(
            goal_id.clone(),
            ClientGoal {
                state: state.clone(),
                registrations,
            },
        );

        if let Err(err) = self.publish_goal(&goal).await {
            self.goals.lock().unwrap().remove(&goal_id);
            for registration in registrations.iter() {
                self.runtime.unregister(*registration);
            }
            return Err(err);
        }

        info!("Sent goal {} for action '{}'", goal_id, self.channel);
        Ok(ActionHandle {
            state,
            runtime: self.runtime.clone(),
        })
    }

    /// Release every per-goal subscription and fail outstanding waiters.
    pub fn stop(&self) {
        let goals: Vec<ClientGoal<F, R>> = {
            let mut map = self.goals.lock().unwrap();
            map.drain().map(|(_, goal)| goal).collect()
        };
        for goal in goals {
            for registration in goal.registrations.iter() {
                self.runtime.unregister(*registration);
            }
            let status = *goal.state.status.lock().unwrap();
            goal.state.complete(
                error::ClientStopped {
                    channel: self.channel.clone(),
                    id: goal.state.goal_id.clone(),
                }
                .fail(),
                status,
            );
        }
        info!("ActionClient for '{}' stopped", self.channel);
    }

    async fn publish_goal(&self, goal: &G) -> Result<(), Error> {
        let payload = goal.encode()?;
        let channel = names::action_goal(&self.channel);
        self.runtime
            .bus()
            .publish(&channel, &payload)
            .await
            .context(error::BusPublish { channel })
    }

    /// Dispatch callback fanning feedback out to the matching handle.
    fn feedback_callback(&self) -> DispatchCallback {
        let goals = self.goals.clone();
        Arc::new(move |message: BusMessage| {
            let goals = goals.clone();
            Box::pin(async move {
                let feedback = match F::decode(&message.payload) {
                    Ok(feedback) => feedback,
                    Err(err) => {
                        error!(
                            "Dropping undecodable feedback on '{}': {}",
                            message.channel, err
                        );
                        return;
                    }
                };
                let goal_id = feedback.header().id.clone();
                let state = goals
                    .lock()
                    .unwrap()
                    .get(&goal_id)
                    .map(|goal| goal.state.clone());
                match state {
                    Some(state) => state.deliver_feedback(feedback),
                    None => debug!("Feedback for unknown goal '{}' dropped", goal_id),
                }
            })
        })
    }

    /// Dispatch callback completing the matching handle with the terminal
    /// result and releasing the goal's subscriptions.
    fn result_callback(&self) -> DispatchCallback {
        let goals = self.goals.clone();
        let runtime = self.runtime.downgrade();
        let channel = self.channel.clone();
        Arc::new(move |message: BusMessage| {
            let goals = goals.clone();
            let runtime = runtime.clone();
            let channel = channel.clone();
            Box::pin(async move {
                let result = match R::decode(&message.payload) {
                    Ok(result) => result,
                    Err(err) => {
                        error!(
                            "Dropping undecodable result on '{}': {}",
                            message.channel, err
                        );
                        return;
                    }
                };
                let (goal_id, status, status_message) = match terminal_of(&result) {
                    Some(terminal) => terminal,
                    None => {
                        error!("Result without correlation data on '{}' dropped", channel);
                        return;
                    }
                };
                let entry = goals.lock().unwrap().remove(&goal_id);
                match entry {
                    Some(goal) => {
                        for registration in goal.registrations.iter() {
                            runtime.unregister(*registration);
                        }
                        let outcome = if status == GoalStatus::Succeeded {
                            Ok(result)
                        } else {
                            error::GoalFailed {
                                goal_id: goal_id.clone(),
                                status,
                                message: status_message,
                            }
                            .fail()
                        };
                        goal.state.complete(outcome, status);
                    }
                    None => debug!("Result for unknown goal '{}' dropped", goal_id),
                }
            })
        })
    }
}

impl<G, F, R> Drop for ActionClient<G, F, R> {
    fn drop(&mut self) {
        for (_, goal) in self.goals.lock().unwrap().drain() {
            for registration in goal.registrations.iter() {
                self.runtime.unregister(*registration);
            }
        }
    }
}

/// Goal id and terminal status carried by either result variant.
fn terminal_of<R: ActionResult>(result: &R) -> Option<(String, GoalStatus, String)> {
    if let Some(status) = result.status() {
        return Some((
            status.header.id.clone(),
            status.status,
            status.message.clone(),
        ));
    }
    if let Some(header) = result.response_header() {
        let status = if header.success {
            GoalStatus::Succeeded
        } else {
            GoalStatus::Aborted
        };
        return Some((header.header.id.clone(), status, header.error_message.clone()));
    }
    None
}

/// Context handed to action handlers.
///
/// Carries the cooperative cancellation flag and the per-goal feedback
/// publisher. Handlers observing `is_cancelled` should stop early and return
/// [`GoalError::Canceled`].
pub struct GoalContext<F> {
    goal_id: String,
    feedback_channel: String,
    bus: DynBus,
    cancelled: Arc<AtomicBool>,
    feedback_type: PhantomData<F>,
}

impl<F: ActionFeedback> GoalContext<F> {
    /// The goal this context belongs to.
    pub fn goal_id(&self) -> &str {
        &self.goal_id
    }

    /// Whether a cancellation request was received for this goal.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Stamp and publish one feedback message for this goal. The caller's
    /// instance is left untouched.
    pub async fn send_feedback(&self, feedback: &F) -> Result<(), Error> {
        let mut feedback = feedback.clone();
        feedback.header_mut().stamp(self.goal_id.as_str());
        let payload = feedback.encode()?;
        self.bus
            .publish(&self.feedback_channel, &payload)
            .await
            .context(error::BusPublish {
                channel: self.feedback_channel.clone(),
            })
    }
}

type ActionHandlerFn<F, G, R> =
    Arc<dyn Fn(GoalContext<F>, G) -> BoxFuture<'static, Result<R, GoalError>> + Send + Sync>;

/// Server-side bookkeeping for one in-flight goal.
struct ServerGoal {
    cancelled: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

type ServerGoalMap = Arc<Mutex<HashMap<String, ServerGoal>>>;

/// Typed server executing goals from a single action channel.
///
/// Every accepted goal runs in its own worker task, so long goals block
/// neither the dispatch worker nor each other. Cancellation never preempts a
/// worker: the goal is dropped from the active map and its context flag
/// raised; a cooperating handler returns [`GoalError::Canceled`] promptly,
/// anything else ends `Succeeded` or `Aborted` as observed.
pub struct ActionServer<G, F, R> {
    runtime: Runtime,
    channel: String,
    handler: ActionHandlerFn<F, G, R>,
    goals: ServerGoalMap,
    registrations: Mutex<Vec<RegistrationId>>,
}

impl<G, F, R> ActionServer<G, F, R>
where
    G: ActionGoal,
    F: ActionFeedback,
    R: ActionResult,
{
    /// New server; types and arguments are validated once here.
    pub fn new<H, Fut>(runtime: &Runtime, channel: &str, handler: H) -> Result<Self, Error>
    where
        H: Fn(GoalContext<F>, G) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, GoalError>> + Send + 'static,
    {
        contract::verify_action::<G, F, R>(channel)?;
        let handler: ActionHandlerFn<F, G, R> =
            Arc::new(move |context, goal| Box::pin(handler(context, goal)));
        info!(
            "ActionServer created for '{}' with types {} -> {} -> {}",
            channel,
            G::TYPE_NAME,
            F::TYPE_NAME,
            R::TYPE_NAME
        );
        Ok(Self {
            runtime: runtime.clone(),
            channel: channel.to_string(),
            handler,
            goals: Default::default(),
            registrations: Mutex::new(Vec::new()),
        })
    }

    /// The action channel this server executes for.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Whether the server currently holds its goal/cancel subscriptions.
    pub fn is_running(&self) -> bool {
        !self.registrations.lock().unwrap().is_empty()
    }

    /// Subscribe to the goal and cancel channels and begin serving.
    pub async fn start(&self) -> Result<(), Error> {
        if self.is_running() {
            warn!("Action server for '{}' is already running", self.channel);
            return Ok(());
        }
        self.runtime.start_handler().await;
        let goal_channel = names::action_goal(&self.channel);
        let cancel_channel = names::action_cancel(&self.channel);
        let goal_registration = self
            .runtime
            .register(&goal_channel, self.goal_callback())
            .await?;
        let cancel_registration = match self
            .runtime
            .register(&cancel_channel, self.cancel_callback())
            .await
        {
            Ok(registration) => registration,
            Err(err) => {
                self.runtime.unregister(goal_registration);
                return Err(err);
            }
        };
        let mut registrations = self.registrations.lock().unwrap();
        if !registrations.is_empty() {
            // lost a start/start race; keep the first registrations
            drop(registrations);
            self.runtime.unregister(goal_registration);
            self.runtime.unregister(cancel_registration);
            warn!("Action server for '{}' is already running", self.channel);
            return Ok(());
        }
        registrations.push(goal_registration);
        registrations.push(cancel_registration);
        drop(registrations);
        info!(
            "Action server listening on '{}' and '{}'",
            goal_channel, cancel_channel
        );
        Ok(())
    }

    /// Stop serving: release the subscriptions and give in-flight workers a
    /// short grace period to finish.
    pub async fn stop(&self) {
        let registrations: Vec<RegistrationId> =
            self.registrations.lock().unwrap().drain(..).collect();
        if registrations.is_empty() {
            warn!("Action server for '{}' is not running", self.channel);
            return;
        }
        for registration in registrations {
            self.runtime.unregister(registration);
        }
        let workers: Vec<(String, JoinHandle<()>)> = {
            let mut goals = self.goals.lock().unwrap();
            goals
                .drain()
                .filter_map(|(goal_id, mut goal)| goal.worker.take().map(|w| (goal_id, w)))
                .collect()
        };
        for (goal_id, worker) in workers {
            if tokio::time::timeout(Duration::from_secs(1), worker)
                .await
                .is_err()
            {
                warn!(
                    "Goal {} worker did not finish within the stop grace period",
                    goal_id
                );
            }
        }
        info!("Action server for '{}' stopped", self.channel);
    }

    /// Serve until `stop` is called from elsewhere.
    pub async fn spin(&self) -> Result<(), Error> {
        self.start().await?;
        while self.is_running() {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        Ok(())
    }

    /// Dispatch callback registering the goal and spawning its worker; the
    /// dispatch worker returns immediately.
    fn goal_callback(&self) -> DispatchCallback {
        let handler = self.handler.clone();
        let goals = self.goals.clone();
        let bus = self.runtime.bus().clone();
        let channel = self.channel.clone();
        Arc::new(move |message: BusMessage| {
            let handler = handler.clone();
            let goals = goals.clone();
            let bus = bus.clone();
            let channel = channel.clone();
            Box::pin(async move {
                let goal = match G::decode(&message.payload) {
                    Ok(goal) => goal,
                    Err(err) => {
                        error!(
                            "Dropping undecodable goal on '{}': {}",
                            message.channel, err
                        );
                        return;
                    }
                };
                let goal_id = goal.header().id.clone();
                info!("Received goal {} for action '{}'", goal_id, channel);

                let cancelled = Arc::new(AtomicBool::new(false));
                let context = GoalContext {
                    goal_id: goal_id.clone(),
                    feedback_channel: names::action_feedback(&channel, &goal_id),
                    bus: bus.clone(),
                    cancelled: cancelled.clone(),
                    feedback_type: PhantomData,
                };
                goals.lock().unwrap().insert(
                    goal_id.clone(),
                    ServerGoal {
                        cancelled,
                        worker: None,
                    },
                );
                let worker = tokio::spawn(execute_goal(
                    handler,
                    context,
                    goal,
                    goals.clone(),
                    bus,
                    channel,
                ));
                if let Some(entry) = goals.lock().unwrap().get_mut(&goal_id) {
                    entry.worker = Some(worker);
                }
            })
        })
    }

    /// Dispatch callback handling cancellation requests.
    fn cancel_callback(&self) -> DispatchCallback {
        let goals = self.goals.clone();
        let channel = self.channel.clone();
        Arc::new(move |message: BusMessage| {
            let goals = goals.clone();
            let channel = channel.clone();
            Box::pin(async move {
                let cancel = match ActionCancel::decode(&message.payload) {
                    Ok(cancel) => cancel,
                    Err(err) => {
                        error!(
                            "Dropping undecodable cancel on '{}': {}",
                            message.channel, err
                        );
                        return;
                    }
                };
                if cancel.goal_id != cancel.header.id {
                    warn!(
                        "Cancel with mismatched ids ('{}' vs '{}') dropped",
                        cancel.goal_id, cancel.header.id
                    );
                    return;
                }
                let entry = goals.lock().unwrap().remove(&cancel.goal_id);
                match entry {
                    Some(goal) => {
                        goal.cancelled.store(true, Ordering::SeqCst);
                        info!(
                            "Cancelling goal {} for action '{}'",
                            cancel.goal_id, channel
                        );
                    }
                    None => debug!("Cancel for unknown goal '{}' dropped", cancel.goal_id),
                }
            })
        })
    }
}

impl<G, F, R> Drop for ActionServer<G, F, R> {
    fn drop(&mut self) {
        for registration in self.registrations.lock().unwrap().drain(..) {
            self.runtime.unregister(registration);
        }
    }
}

/// Worker body for one goal: run the handler, publish exactly one terminal
/// result, deregister the goal.
async fn execute_goal<G, F, R>(
    handler: ActionHandlerFn<F, G, R>,
    context: GoalContext<F>,
    goal: G,
    goals: ServerGoalMap,
    bus: DynBus,
    channel: String,
) where
    G: ActionGoal,
    F: ActionFeedback,
    R: ActionResult,
{
    let goal_id = context.goal_id().to_string();
    let (mut result, status, message) = match handler(context, goal).await {
        Ok(result) => (result, GoalStatus::Succeeded, String::new()),
        Err(GoalError::Canceled { message }) => {
            info!("Goal {} canceled by its handler: {}", goal_id, message);
            (R::default(), GoalStatus::Canceled, message)
        }
        Err(err) => {
            error!("Action handler for goal {} failed: {}", goal_id, err);
            (R::default(), GoalStatus::Aborted, err.to_string())
        }
    };
    stamp_result(&mut result, &goal_id, status, &message);

    let result_channel = names::action_result(&channel, &goal_id);
    match result.encode() {
        Ok(payload) => {
            if let Err(err) = bus.publish(&result_channel, &payload).await {
                error!(
                    "Failed to publish the result on '{}': {}",
                    result_channel, err
                );
            }
        }
        Err(err) => error!("Failed to encode the result for goal {}: {}", goal_id, err),
    }

    goals.lock().unwrap().remove(&goal_id);
    info!(
        "Action goal {} completed with status '{}'",
        goal_id,
        status.to_string()
    );
}

/// Write the terminal status into whichever block(s) the result type
/// carries.
fn stamp_result<R: ActionResult>(result: &mut R, goal_id: &str, status: GoalStatus, message: &str) {
    if let Some(block) = result.status_mut() {
        block.header.stamp(goal_id);
        block.status = status;
        block.message = message.to_string();
    }
    if let Some(header) = result.response_header_mut() {
        header.header.stamp(goal_id);
        header.success = status == GoalStatus::Succeeded;
        header.error_message = if header.success {
            String::new()
        } else if message.is_empty() {
            format!("goal ended with status '{}'", status.to_string())
        } else {
            message.to_string()
        };
    }
}
