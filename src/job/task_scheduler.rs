use std::collections::HashMap;

use chrono::FixedOffset;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Duration, MissedTickBehavior};
use tracing::{debug, info};

use crate::error::{AppError, AppResult};
use crate::time_util;

/// 后台任务调度：固定间隔任务与每日零点任务，统一停止
pub struct TaskScheduler {
    periodic_tasks: HashMap<String, JoinHandle<()>>,
    daily_tasks: HashMap<String, JoinHandle<()>>,
    shutdown_sender: broadcast::Sender<()>,
}

impl TaskScheduler {
    pub fn new() -> Self {
        let (shutdown_sender, _) = broadcast::channel(16);
        Self {
            periodic_tasks: HashMap::new(),
            daily_tasks: HashMap::new(),
            shutdown_sender,
        }
    }
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskScheduler {
    /// 停止信号的订阅端，供调度器之外的长任务使用
    pub fn shutdown_receiver(&self) -> broadcast::Receiver<()> {
        self.shutdown_sender.subscribe()
    }

    pub fn task_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .periodic_tasks
            .keys()
            .chain(self.daily_tasks.keys())
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn add_periodic_task<F, Fut>(
        &mut self,
        name: impl Into<String>,
        every_n_millis: u64,
        task_fn: F,
    ) -> AppResult<()>
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        if every_n_millis < 100 {
            return Err(AppError::Config(format!(
                "任务 {} 间隔 {}ms 小于最小值 100ms",
                name, every_n_millis
            )));
        }

        let mut interval_timer = interval(Duration::from_millis(every_n_millis));
        interval_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut shutdown_receiver = self.shutdown_sender.subscribe();
        let task_name = name.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = interval_timer.tick() => {
                        task_fn().await;
                    }
                    _ = shutdown_receiver.recv() => {
                        debug!("周期任务 {} 已停止", task_name);
                        break;
                    }
                }
            }
        });
        if let Some(old) = self.periodic_tasks.insert(name, handle) {
            old.abort();
        }
        Ok(())
    }

    /// 每个本地零点执行一次，`now_fn` 提供当前毫秒时间
    pub fn add_daily_task<F, Fut, N>(
        &mut self,
        name: impl Into<String>,
        offset: FixedOffset,
        now_fn: N,
        task_fn: F,
    ) where
        F: Fn() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
        N: Fn() -> i64 + Send + 'static,
    {
        let name = name.into();
        let mut shutdown_receiver = self.shutdown_sender.subscribe();
        let task_name = name.clone();
        let handle = tokio::spawn(async move {
            loop {
                let wait_ms = time_util::ms_until_next_midnight(now_fn(), offset);
                debug!("每日任务 {} 将在 {}ms 后执行", task_name, wait_ms);
                tokio::select! {
                    _ = sleep(Duration::from_millis(wait_ms as u64)) => {
                        info!("执行每日任务 {}", task_name);
                        task_fn().await;
                    }
                    _ = shutdown_receiver.recv() => {
                        debug!("每日任务 {} 已停止", task_name);
                        break;
                    }
                }
            }
        });
        if let Some(old) = self.daily_tasks.insert(name, handle) {
            old.abort();
        }
    }

    pub async fn shutdown(self) {
        // 发送关闭信号
        let _ = self.shutdown_sender.send(());

        // 等待所有任务完成
        for handle in self.periodic_tasks.into_values() {
            let _ = handle.await;
        }
        for handle in self.daily_tasks.into_values() {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_periodic_task_runs_until_shutdown() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut scheduler = TaskScheduler::new();
        let c = count.clone();
        scheduler
            .add_periodic_task("tick", 1000, move || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                }
            })
            .unwrap();
        tokio::time::sleep(Duration::from_millis(3500)).await;
        scheduler.shutdown().await;
        // 首次立即执行，之后每秒一次
        assert_eq!(count.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_rejects_short_interval() {
        let mut scheduler = TaskScheduler::new();
        assert!(scheduler.add_periodic_task("fast", 10, || async {}).is_err());
        assert!(scheduler.task_names().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_daily_task_fires_at_midnight() {
        // 2024-03-10 23:59:00 UTC
        let base = 1_710_115_140_000_i64;
        let started = tokio::time::Instant::now();
        let now_fn = move || base + started.elapsed().as_millis() as i64;
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let mut scheduler = TaskScheduler::new();
        scheduler.add_daily_task("midnight", time_util::fixed_offset(0), now_fn, move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });
        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.task_names(), vec!["midnight".to_string()]);
        scheduler.shutdown().await;
    }
}
