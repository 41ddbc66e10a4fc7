//! Task registry - create, execute, observe and cancel tasks
//!
//! Single in-process authority over the task collection. Tasks are owned by
//! the registry; every `Task` handed out is a snapshot. Change notifications
//! are emitted strictly after the corresponding mutation, so a subscriber
//! that re-reads on notification always observes the new state.

use crate::agent::{agent_settings, AgentKind};
use crate::daemon::PromptSession;
use crate::executor::{ExecOptions, Executor, ProcessExecutor};
use crate::state::TaskStatus;
use crate::task::{Task, TaskId};
use relay_foundation::{Error, ProgressFragment, ProgressKind, Result, Settings, TaskEvent, TaskNotifier};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, info, warn};

/// Builds the one-shot executor for a task. The seam tests use to substitute
/// stub executors.
pub type ExecutorFactory = Arc<dyn Fn(&Task) -> Arc<dyn Executor> + Send + Sync>;

/// In-process task registry.
///
/// Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct TaskRegistry {
    tasks: Arc<RwLock<HashMap<TaskId, Task>>>,

    /// Executors for tasks currently running on the one-shot path, kept so
    /// `cancel_task` can reach the live process
    active: Arc<RwLock<HashMap<TaskId, Arc<dyn Executor>>>>,

    /// One persistent session per agent kind, for the daemon path
    daemons: Arc<HashMap<AgentKind, Arc<dyn PromptSession>>>,

    settings: Arc<Settings>,
    notifier: TaskNotifier,
    factory: ExecutorFactory,
    next_id: Arc<AtomicU64>,

    /// Set once on shutdown; suppresses further progress events
    closed: Arc<AtomicBool>,
}

impl TaskRegistry {
    pub fn new(settings: Settings, daemons: HashMap<AgentKind, Arc<dyn PromptSession>>) -> Self {
        let settings = Arc::new(settings);
        let factory_settings = Arc::clone(&settings);
        let factory: ExecutorFactory = Arc::new(move |task: &Task| {
            let program = agent_settings(&factory_settings, task.agent)
                .executable
                .clone()
                .unwrap_or_else(|| task.agent.binary_name().to_string());
            Arc::new(ProcessExecutor::new(
                program,
                task.agent.one_shot_args(&task.prompt),
            )) as Arc<dyn Executor>
        });

        Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
            active: Arc::new(RwLock::new(HashMap::new())),
            daemons: Arc::new(daemons),
            settings,
            notifier: TaskNotifier::new(),
            factory,
            next_id: Arc::new(AtomicU64::new(1)),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Replace the executor factory (used by tests to stub out processes)
    pub fn with_factory(mut self, factory: ExecutorFactory) -> Self {
        self.factory = factory;
        self
    }

    /// Subscribe to task change and progress events
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.notifier.subscribe()
    }

    /// Create a new pending task and return its snapshot
    pub async fn create_task(&self, agent: AgentKind, prompt: impl Into<String>) -> Task {
        let id = TaskId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let task = Task::new(id, agent, prompt);

        self.tasks.write().await.insert(id, task.clone());
        self.notifier.tasks_changed();

        info!(task = %id, agent = %task.agent, "task created");
        task
    }

    /// Execute a pending task to completion and return its final snapshot.
    ///
    /// Fails with `NotFound` for an unknown id and `InvalidState` when the
    /// task is not pending. Execution failures are recorded on the task and
    /// re-signalled to the caller.
    pub async fn execute_task(&self, id: TaskId) -> Result<Task> {
        let (agent, prompt) = {
            let mut tasks = self.tasks.write().await;
            let task = tasks
                .get_mut(&id)
                .ok_or_else(|| Error::NotFound(format!("{id}")))?;
            if !task.status.is_pending() {
                return Err(Error::InvalidState(format!(
                    "{id} is {}, only pending tasks can be executed",
                    task.status
                )));
            }
            task.start();
            (task.agent, task.prompt.clone())
        };
        self.notifier.tasks_changed();

        let settings = agent_settings(&self.settings, agent);
        let result = if settings.use_daemon && self.daemons.contains_key(&agent) {
            self.run_via_daemon(id, agent, &prompt).await
        } else {
            self.run_via_process(id).await
        };

        self.finalize(id, result).await
    }

    /// Daemon path: route the prompt through the agent's persistent session
    async fn run_via_daemon(&self, id: TaskId, agent: AgentKind, prompt: &str) -> Result<String> {
        debug!(task = %id, agent = %agent, "dispatching via session daemon");
        let daemon = self
            .daemons
            .get(&agent)
            .ok_or_else(|| Error::Daemon(format!("no session daemon for {agent}")))?;
        daemon.send_prompt(prompt).await
    }

    /// One-shot path: fresh process per task, progress streamed live
    async fn run_via_process(&self, id: TaskId) -> Result<String> {
        let (executor, timeout) = {
            let tasks = self.tasks.read().await;
            let task = tasks
                .get(&id)
                .ok_or_else(|| Error::NotFound(format!("{id}")))?;
            let timeout = agent_settings(&self.settings, task.agent).timeout();
            ((self.factory)(task), timeout)
        };

        self.active.write().await.insert(id, Arc::clone(&executor));

        let (tx, mut rx) = mpsc::unbounded_channel::<ProgressFragment>();

        // Pump fragments into the task record as they arrive. Ends when the
        // executor drops its sender end on return.
        let tasks = Arc::clone(&self.tasks);
        let notifier = self.notifier.clone();
        let closed = Arc::clone(&self.closed);
        let pump = tokio::spawn(async move {
            while let Some(fragment) = rx.recv().await {
                {
                    let mut tasks = tasks.write().await;
                    if let Some(task) = tasks.get_mut(&id) {
                        match fragment.kind {
                            ProgressKind::Output => {
                                task.append_output(&fragment.text);
                                task.bump_progress();
                            }
                            ProgressKind::Error => task.append_output(&fragment.text),
                            ProgressKind::Complete => {}
                        }
                    }
                }
                if !closed.load(Ordering::SeqCst) {
                    notifier.progress(id.0, fragment);
                }
            }
        });

        let opts = ExecOptions {
            timeout: Some(timeout),
            progress: Some(tx),
            ..Default::default()
        };
        let result = executor.execute(opts).await;

        let _ = pump.await;
        result
    }

    /// Apply the execution outcome to the task, notify, and re-signal
    /// failures to the caller.
    ///
    /// A task already in a terminal state (cancelled underneath the
    /// execution, or shut down) is left untouched; the late outcome is
    /// dropped.
    async fn finalize(&self, id: TaskId, result: Result<String>) -> Result<Task> {
        let outcome = {
            let mut tasks = self.tasks.write().await;
            let task = tasks
                .get_mut(&id)
                .ok_or_else(|| Error::NotFound(format!("{id}")))?;

            if task.status.is_terminal() {
                debug!(task = %id, status = %task.status, "dropping late execution outcome");
                Ok(task.clone())
            } else {
                match result {
                    Ok(output) => {
                        if task.output.is_empty() && !output.is_empty() {
                            // Daemon path: no streamed fragments, take the
                            // response wholesale
                            task.output = output;
                        }
                        task.complete();
                        Ok(task.clone())
                    }
                    Err(e) => {
                        if let Some(partial) = e.partial_output() {
                            if task.output.is_empty() && !partial.is_empty() {
                                task.output = partial.to_string();
                            }
                        }
                        task.fail(e.to_string());
                        Err(e)
                    }
                }
            }
        };

        self.active.write().await.remove(&id);
        self.notifier.tasks_changed();

        match &outcome {
            Ok(task) => info!(task = %id, status = %task.status, "task finished"),
            Err(e) => info!(task = %id, error = %e, "task failed"),
        }
        outcome
    }

    /// Cancel an active task.
    ///
    /// Kills the one-shot process when there is one; a daemon-backed task is
    /// only marked cancelled, the session itself keeps running. Returns false
    /// for unknown or already-terminal tasks.
    pub async fn cancel_task(&self, id: TaskId) -> bool {
        // Mark cancelled before killing the process: the execution unwinds
        // concurrently and its late outcome must land on a terminal task
        {
            let mut tasks = self.tasks.write().await;
            match tasks.get_mut(&id) {
                Some(task) if task.is_active() => {
                    if task.status.is_pending() {
                        // Pending tasks move through running so the state
                        // machine sees a legal path to cancelled
                        task.start();
                    }
                    task.cancel();
                }
                _ => return false,
            }
        }

        if let Some(executor) = self.active.write().await.remove(&id) {
            executor.cancel().await;
        }
        self.notifier.tasks_changed();

        info!(task = %id, "task cancelled");
        true
    }

    /// Get a snapshot of a task
    pub async fn get_task(&self, id: TaskId) -> Option<Task> {
        self.tasks.read().await.get(&id).cloned()
    }

    /// All tasks, ordered by id
    pub async fn all_tasks(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.tasks.read().await.values().cloned().collect();
        tasks.sort_by_key(|t| t.id);
        tasks
    }

    /// Tasks currently running, ordered by id
    pub async fn running_tasks(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .tasks
            .read()
            .await
            .values()
            .filter(|t| t.status.is_running())
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.id);
        tasks
    }

    /// Tasks in a terminal state, ordered by id
    pub async fn finished_tasks(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .tasks
            .read()
            .await
            .values()
            .filter(|t| t.status.is_terminal())
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.id);
        tasks
    }

    /// Cancel everything in flight and stop emitting progress events
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);

        // Same ordering as cancel_task: terminal state first, kill second
        {
            let mut tasks = self.tasks.write().await;
            for task in tasks.values_mut() {
                if task.is_active() {
                    if task.status.is_pending() {
                        task.start();
                    }
                    task.cancel();
                }
            }
        }

        let active: Vec<(TaskId, Arc<dyn Executor>)> =
            self.active.write().await.drain().collect();
        for (id, executor) in &active {
            warn!(task = %id, "cancelling task on shutdown");
            executor.cancel().await;
        }
        self.notifier.tasks_changed();

        info!(cancelled = active.len(), "registry shut down");
    }

    /// Terminal-state counts: (completed, failed, cancelled)
    pub async fn stats(&self) -> (usize, usize, usize) {
        let tasks = self.tasks.read().await;
        let count =
            |status: TaskStatus| tasks.values().filter(|t| t.status == status).count();
        (
            count(TaskStatus::Completed),
            count(TaskStatus::Failed),
            count(TaskStatus::Cancelled),
        )
    }
}
