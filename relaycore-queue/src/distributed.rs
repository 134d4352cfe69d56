// relaycore-queue/src/distributed.rs
// ============================================================================
// Module: RelayCore Distributed Task Queue
// Description: Redis-backed Task Queue for horizontally-scaled deployments.
// Purpose: Implement the same contract as `task_queue::InMemoryTaskQueue`,
// additionally guaranteeing at-most-one lease globally across worker
// processes.
// Dependencies: relaycore-core::{Task, TaskId, ...}, redis (tokio-comp,
// connection-manager)
// ============================================================================

//! ## Overview
//! Pending tasks live in one Redis sorted set per priority class, scored by
//! enqueue time, so `ZPOPMIN`-style pops are FIFO within a class. A pop is
//! realized as an atomic `ZREM` of a specific member: because the sorted set
//! is the sole authority over "is this task still waiting," a successful
//! `ZREM` is itself the at-most-one-lease guarantee — no second dequeuer can
//! ever observe a member already removed. Leased tasks move to a
//! lease-tracking sorted set scored by expiry time, so the sweeper can find
//! overdue leases with a single `ZRANGEBYSCORE`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::Script;
use redis::aio::ConnectionManager;
use relaycore_core::LeaseId;
use relaycore_core::Task;
use relaycore_core::TaskId;
use relaycore_core::TaskPriority;
use relaycore_core::TaskState;
use relaycore_core::Timestamp;
use tracing::info;
use tracing::warn;
use uuid::Uuid;

use crate::task_queue::AckResult;
use crate::task_queue::LeasedTask;
use crate::task_queue::MAX_DEQUEUE_PEEK;
use crate::task_queue::QueueSnapshot;
use crate::task_queue::TaskQueue;
use crate::task_queue::TaskQueueError;

// ============================================================================
// SECTION: Priority Ordering
// ============================================================================

const PRIORITY_CLASSES: [TaskPriority; 5] = [
    TaskPriority::Critical,
    TaskPriority::High,
    TaskPriority::Normal,
    TaskPriority::Low,
    TaskPriority::Batch,
];

fn priority_key(prefix: &str, priority: TaskPriority) -> String {
    let name = match priority {
        TaskPriority::Critical => "critical",
        TaskPriority::High => "high",
        TaskPriority::Normal => "normal",
        TaskPriority::Low => "low",
        TaskPriority::Batch => "batch",
    };
    format!("{prefix}:pending:{name}")
}

// ============================================================================
// SECTION: Redis Task Queue
// ============================================================================

/// Redis-backed Task Queue implementation, used in multi-node deployments
/// where the Control Plane dispatches across a worker fleet.
///
/// # Invariants
/// - A task id is present in at most one of {a pending sorted set, the
///   leased sorted set, the dead-letter set} at any time.
pub struct RedisTaskQueue {
    conn: ConnectionManager,
    prefix: String,
    pop_script: Script,
}

impl RedisTaskQueue {
    /// Connects to `redis_url`, using `key_prefix` to namespace all keys
    /// (allowing multiple deployments to share one Redis instance).
    ///
    /// # Errors
    ///
    /// Returns [`TaskQueueError::Durability`] when the connection cannot be
    /// established.
    pub async fn connect(redis_url: &str, key_prefix: impl Into<String>) -> Result<Self, TaskQueueError> {
        let client =
            redis::Client::open(redis_url).map_err(|err| TaskQueueError::Durability(err.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|err| TaskQueueError::Durability(err.to_string()))?;
        Ok(Self {
            conn,
            prefix: key_prefix.into(),
            pop_script: Script::new(POP_SCRIPT),
        })
    }

    fn task_key(&self, task_id: &TaskId) -> String {
        format!("{}:task:{}", self.prefix, task_id.as_str())
    }

    fn leased_key(&self) -> String {
        format!("{}:leased", self.prefix)
    }

    fn dead_letter_key(&self) -> String {
        format!("{}:deadletter", self.prefix)
    }

    fn now_millis() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
    }
}

/// Atomically removes `task_id` from a priority sorted set only if it is
/// still present, preventing two dequeuers from ever popping the same
/// member — the sole source of the at-most-one-lease guarantee.
const POP_SCRIPT: &str = r"
local removed = redis.call('ZREM', KEYS[1], ARGV[1])
return removed
";

#[async_trait]
impl TaskQueue for RedisTaskQueue {
    async fn enqueue(&self, task: Task) {
        let mut conn = self.conn.clone();
        let key = priority_key(&self.prefix, task.priority);
        let score = task.enqueued_at.as_unix_millis().unwrap_or_else(Self::now_millis);
        let task_key = self.task_key(&task.task_id);
        let task_id = task.task_id.clone();
        let Ok(serialized) = serde_json::to_string(&task) else {
            warn!(task_id = %task_id, "failed to serialize task for redis enqueue");
            return;
        };
        let pipeline_result: redis::RedisResult<()> = redis::pipe()
            .atomic()
            .set(&task_key, serialized)
            .zadd(&key, task_id.as_str(), score)
            .query_async(&mut conn)
            .await;
        match pipeline_result {
            Ok(()) => info!(task_id = %task_id, priority = ?task.priority, "task enqueued to redis"),
            Err(err) => warn!(task_id = %task_id, error = %err, "redis enqueue failed"),
        }
    }

    async fn dequeue(
        &self,
        worker_capabilities: &[String],
        lease_duration: Duration,
    ) -> Result<Option<LeasedTask>, TaskQueueError> {
        let mut conn = self.conn.clone();
        for priority in PRIORITY_CLASSES {
            let key = priority_key(&self.prefix, priority);
            let candidates: Vec<String> = conn
                .zrange(&key, 0, (MAX_DEQUEUE_PEEK as isize) - 1)
                .await
                .map_err(|err| TaskQueueError::Durability(err.to_string()))?;

            for task_id_str in candidates {
                let task_key = format!("{}:task:{}", self.prefix, task_id_str);
                let raw: Option<String> = conn
                    .get(&task_key)
                    .await
                    .map_err(|err| TaskQueueError::Durability(err.to_string()))?;
                let Some(raw) = raw else { continue };
                let Ok(mut task) = serde_json::from_str::<Task>(&raw) else {
                    continue;
                };
                if !task.dispatchable_to(worker_capabilities) {
                    continue;
                }

                let removed: i64 = self
                    .pop_script
                    .key(&key)
                    .arg(&task_id_str)
                    .invoke_async(&mut conn)
                    .await
                    .map_err(|err| TaskQueueError::Durability(err.to_string()))?;
                if removed == 0 {
                    // Another worker popped this member between our peek and
                    // our pop attempt; move on to the next candidate.
                    continue;
                }

                let lease_id = LeaseId::new(Uuid::new_v4().to_string());
                let now = Self::now_millis();
                let expires_at = now + i64::try_from(lease_duration.as_millis()).unwrap_or(i64::MAX);
                task.state = TaskState::Leased;
                task.attempt += 1;
                task.lease_id = Some(lease_id.clone());
                task.lease_expires_at = Some(Timestamp::UnixMillis(expires_at));

                let Ok(serialized) = serde_json::to_string(&task) else {
                    return Err(TaskQueueError::Durability("serialize leased task".to_string()));
                };
                let leased_key = self.leased_key();
                let _: () = redis::pipe()
                    .atomic()
                    .set(&task_key, serialized)
                    .zadd(&leased_key, task_id_str.as_str(), expires_at)
                    .query_async(&mut conn)
                    .await
                    .map_err(|err| TaskQueueError::Durability(err.to_string()))?;

                info!(task_id = %task.task_id, attempt = task.attempt, "task leased via redis");
                return Ok(Some(LeasedTask { task, lease_id }));
            }
        }
        Ok(None)
    }

    async fn ack(&self, lease_id: &LeaseId, result: AckResult) -> Result<(), TaskQueueError> {
        let mut conn = self.conn.clone();
        let task_id = self.find_task_by_lease(&mut conn, lease_id).await?;
        let task_key = self.task_key(&task_id);
        let raw: Option<String> = conn
            .get(&task_key)
            .await
            .map_err(|err| TaskQueueError::Durability(err.to_string()))?;
        let Some(raw) = raw else {
            return Err(TaskQueueError::TaskNotFound(task_id));
        };
        let mut task: Task = serde_json::from_str(&raw).map_err(|err| TaskQueueError::Durability(err.to_string()))?;
        task.state = match result {
            AckResult::Succeeded => TaskState::Succeeded,
            AckResult::Failed => TaskState::Failed,
        };
        task.lease_id = None;
        task.lease_expires_at = None;

        let leased_key = self.leased_key();
        let serialized =
            serde_json::to_string(&task).map_err(|err| TaskQueueError::Durability(err.to_string()))?;
        let _: () = redis::pipe()
            .atomic()
            .set(&task_key, serialized)
            .zrem(&leased_key, task_id.as_str())
            .query_async(&mut conn)
            .await
            .map_err(|err| TaskQueueError::Durability(err.to_string()))?;
        info!(task_id = %task_id, state = ?task.state, "task acked via redis");
        Ok(())
    }

    async fn nack(&self, lease_id: &LeaseId, reason: &str, retry: bool) -> Result<(), TaskQueueError> {
        let mut conn = self.conn.clone();
        let task_id = self.find_task_by_lease(&mut conn, lease_id).await?;
        let task_key = self.task_key(&task_id);
        let raw: Option<String> = conn
            .get(&task_key)
            .await
            .map_err(|err| TaskQueueError::Durability(err.to_string()))?;
        let Some(raw) = raw else {
            return Err(TaskQueueError::TaskNotFound(task_id));
        };
        let mut task: Task = serde_json::from_str(&raw).map_err(|err| TaskQueueError::Durability(err.to_string()))?;
        task.lease_id = None;
        task.lease_expires_at = None;

        let leased_key = self.leased_key();
        if retry && !task.attempts_exhausted() {
            task.state = TaskState::Pending;
            let pending_key = priority_key(&self.prefix, task.priority);
            let score = Self::now_millis();
            let serialized =
                serde_json::to_string(&task).map_err(|err| TaskQueueError::Durability(err.to_string()))?;
            warn!(task_id = %task_id, attempt = task.attempt, %reason, "task nacked via redis, retrying");
            let _: () = redis::pipe()
                .atomic()
                .set(&task_key, serialized)
                .zrem(&leased_key, task_id.as_str())
                .zadd(&pending_key, task_id.as_str(), score)
                .query_async(&mut conn)
                .await
                .map_err(|err| TaskQueueError::Durability(err.to_string()))?;
        } else {
            task.state = TaskState::Dead;
            let dead_letter_key = self.dead_letter_key();
            let serialized =
                serde_json::to_string(&task).map_err(|err| TaskQueueError::Durability(err.to_string()))?;
            warn!(task_id = %task_id, attempt = task.attempt, %reason, "task moved to redis dead letter");
            let _: () = redis::pipe()
                .atomic()
                .set(&task_key, serialized)
                .zrem(&leased_key, task_id.as_str())
                .sadd(&dead_letter_key, task_id.as_str())
                .query_async(&mut conn)
                .await
                .map_err(|err| TaskQueueError::Durability(err.to_string()))?;
        }
        Ok(())
    }

    async fn snapshot(&self) -> QueueSnapshot {
        let mut conn = self.conn.clone();
        let mut pending = Vec::new();
        for priority in PRIORITY_CLASSES {
            let key = priority_key(&self.prefix, priority);
            if let Ok(ids) = conn.zrange::<_, Vec<String>>(&key, 0, -1).await {
                pending.extend(self.load_tasks(&mut conn, &ids).await);
            }
        }
        let leased_key = self.leased_key();
        let leased_ids: Vec<String> = conn.zrange(&leased_key, 0, -1).await.unwrap_or_default();
        let leased = self.load_tasks(&mut conn, &leased_ids).await;

        let dead_letter_key = self.dead_letter_key();
        let dead_ids: Vec<String> = conn.smembers(&dead_letter_key).await.unwrap_or_default();
        let dead_letter = self.load_tasks(&mut conn, &dead_ids).await;

        QueueSnapshot { pending, leased, dead_letter }
    }

    async fn sweep_expired_leases(&self) -> Vec<TaskId> {
        let mut conn = self.conn.clone();
        let leased_key = self.leased_key();
        let now = Self::now_millis();
        let Ok(expired_ids): Result<Vec<String>, _> =
            conn.zrangebyscore(&leased_key, 0, now).await
        else {
            return Vec::new();
        };
        let mut requeued = Vec::new();
        for task_id_str in expired_ids {
            let task_key = format!("{}:task:{}", self.prefix, task_id_str);
            let Ok(Some(raw)) = conn.get::<_, Option<String>>(&task_key).await else {
                continue;
            };
            let Ok(mut task) = serde_json::from_str::<Task>(&raw) else {
                continue;
            };
            task.state = TaskState::Pending;
            task.lease_id = None;
            task.lease_expires_at = None;
            let pending_key = priority_key(&self.prefix, task.priority);
            let Ok(serialized) = serde_json::to_string(&task) else {
                continue;
            };
            let result: redis::RedisResult<()> = redis::pipe()
                .atomic()
                .set(&task_key, serialized)
                .zrem(&leased_key, task_id_str.as_str())
                .zadd(&pending_key, task_id_str.as_str(), now)
                .query_async(&mut conn)
                .await;
            if result.is_ok() {
                warn!(task_id = %task_id_str, "lease expired, task requeued via redis sweep");
                requeued.push(task.task_id);
            }
        }
        requeued
    }
}

impl RedisTaskQueue {
    async fn find_task_by_lease(
        &self,
        conn: &mut ConnectionManager,
        lease_id: &LeaseId,
    ) -> Result<TaskId, TaskQueueError> {
        let leased_key = self.leased_key();
        let ids: Vec<String> = conn
            .zrange(&leased_key, 0, -1)
            .await
            .map_err(|err| TaskQueueError::Durability(err.to_string()))?;
        for id in ids {
            let task_key = format!("{}:task:{}", self.prefix, id);
            if let Ok(Some(raw)) = conn.get::<_, Option<String>>(&task_key).await
                && let Ok(task) = serde_json::from_str::<Task>(&raw)
                && task.lease_id.as_ref() == Some(lease_id)
            {
                return Ok(task.task_id);
            }
        }
        Err(TaskQueueError::LeaseNotFound(lease_id.to_string()))
    }

    async fn load_tasks(&self, conn: &mut ConnectionManager, ids: &[String]) -> Vec<Task> {
        let mut tasks = Vec::with_capacity(ids.len());
        for id in ids {
            let task_key = format!("{}:task:{}", self.prefix, id);
            if let Ok(Some(raw)) = conn.get::<_, Option<String>>(&task_key).await
                && let Ok(task) = serde_json::from_str::<Task>(&raw)
            {
                tasks.push(task);
            }
        }
        tasks
    }
}
