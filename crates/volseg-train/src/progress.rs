//! Progress tracking and callbacks for training runs.
//!
//! The training loop reports every optimizer step to a [`ProgressTracker`],
//! which fans the update out to its registered callbacks.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

/// Progress information for one training step.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Current epoch, 1-based.
    pub epoch: usize,
    /// Total number of epochs.
    pub total_epochs: usize,
    /// Step within the epoch, 1-based.
    pub iteration: usize,
    /// Steps per epoch.
    pub iterations_per_epoch: usize,
    /// Current loss value.
    pub loss: f64,
    /// Time elapsed since start.
    pub elapsed: Duration,
    /// Estimated remaining time.
    pub estimated_remaining: Option<Duration>,
    /// Current learning rate.
    pub learning_rate: f64,
}

impl ProgressInfo {
    /// Create new progress information.
    pub fn new(
        epoch: usize,
        total_epochs: usize,
        iteration: usize,
        iterations_per_epoch: usize,
        loss: f64,
        elapsed: Duration,
        learning_rate: f64,
    ) -> Self {
        Self {
            epoch,
            total_epochs,
            iteration,
            iterations_per_epoch,
            loss,
            elapsed,
            estimated_remaining: None,
            learning_rate,
        }
    }

    /// Steps completed over the whole run.
    pub fn global_step(&self) -> usize {
        self.epoch.saturating_sub(1) * self.iterations_per_epoch + self.iteration
    }

    /// Steps in the whole run.
    pub fn total_steps(&self) -> usize {
        self.total_epochs * self.iterations_per_epoch
    }

    /// Calculate progress percentage.
    pub fn progress_percent(&self) -> f64 {
        match self.total_steps() {
            0 => 0.0,
            total => (self.global_step() as f64 / total as f64) * 100.0,
        }
    }

    /// Calculate estimated remaining time.
    pub fn calculate_remaining(&mut self) {
        let step = self.global_step();
        if step > 0 {
            let avg_time_per_step = self.elapsed.as_secs_f64() / step as f64;
            let remaining = self.total_steps().saturating_sub(step);
            self.estimated_remaining = Some(Duration::from_secs_f64(avg_time_per_step * remaining as f64));
        }
    }
}

/// Progress callback trait for monitoring training.
pub trait ProgressCallback: Send + Sync {
    /// Called after every optimizer step.
    fn on_progress(&self, info: &ProgressInfo);

    /// Called when training starts.
    fn on_start(&self) {}

    /// Called at the end of every epoch with the epoch's mean loss.
    fn on_epoch_end(&self, _epoch: usize, _mean_loss: f64) {}

    /// Called when training completes successfully.
    fn on_complete(&self, _info: &ProgressInfo) {}

    /// Called when training fails.
    fn on_error(&self, _error: &str) {}
}

/// Console progress callback that logs to tracing.
#[derive(Debug, Clone)]
pub struct ConsoleProgressCallback {
    /// Log interval (steps within an epoch).
    pub log_interval: usize,
}

impl Default for ConsoleProgressCallback {
    fn default() -> Self {
        Self { log_interval: 1 }
    }
}

impl ConsoleProgressCallback {
    /// Create a new console progress callback.
    pub fn new(log_interval: usize) -> Self {
        Self {
            log_interval: log_interval.max(1),
        }
    }
}

impl ProgressCallback for ConsoleProgressCallback {
    fn on_progress(&self, info: &ProgressInfo) {
        if info.iteration % self.log_interval == 0 || info.iteration == info.iterations_per_epoch {
            tracing::info!(
                "Epoch [{}/{}], Iteration [{}/{}], Loss: {:.4}",
                info.epoch,
                info.total_epochs,
                info.iteration,
                info.iterations_per_epoch,
                info.loss
            );
        }
    }

    fn on_start(&self) {
        tracing::info!("Training started");
    }

    fn on_epoch_end(&self, epoch: usize, mean_loss: f64) {
        tracing::debug!(epoch, mean_loss, "Epoch finished");
    }

    fn on_complete(&self, info: &ProgressInfo) {
        tracing::info!(
            "Training completed in {:.2}s with final loss: {:.6}",
            info.elapsed.as_secs_f64(),
            info.loss
        );
    }

    fn on_error(&self, error: &str) {
        tracing::error!("Training failed: {}", error);
    }
}

/// Terminal progress bar over all steps of the run.
#[derive(Debug, Clone)]
pub struct ProgressBarCallback {
    bar: ProgressBar,
}

impl ProgressBarCallback {
    pub fn new(total_steps: u64) -> Self {
        let bar = ProgressBar::new(total_steps);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
        {
            bar.set_style(style.progress_chars("#>-"));
        }
        Self { bar }
    }

    /// Progress bar that draws nowhere.
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }
}

impl ProgressCallback for ProgressBarCallback {
    fn on_progress(&self, info: &ProgressInfo) {
        self.bar.set_position(info.global_step() as u64);
        self.bar.set_message(format!("epoch {}/{} loss {:.4}", info.epoch, info.total_epochs, info.loss));
    }

    fn on_complete(&self, info: &ProgressInfo) {
        self.bar.finish_with_message(format!("done, loss {:.4}", info.loss));
    }

    fn on_error(&self, _error: &str) {
        self.bar.abandon();
    }
}

/// History callback that records all progress information.
#[derive(Debug, Clone, Default)]
pub struct HistoryCallback {
    history: Arc<Mutex<Vec<ProgressInfo>>>,
    epoch_losses: Arc<Mutex<Vec<f64>>>,
}

impl HistoryCallback {
    /// Create a new history callback.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the recorded step history.
    pub fn get_history(&self) -> Vec<ProgressInfo> {
        lock(&self.history).clone()
    }

    /// Loss of every recorded step, in order.
    pub fn losses(&self) -> Vec<f64> {
        lock(&self.history).iter().map(|info| info.loss).collect()
    }

    /// Mean loss of every finished epoch, in order.
    pub fn epoch_losses(&self) -> Vec<f64> {
        lock(&self.epoch_losses).clone()
    }

    /// Clear the history.
    pub fn clear(&self) {
        lock(&self.history).clear();
        lock(&self.epoch_losses).clear();
    }
}

impl ProgressCallback for HistoryCallback {
    fn on_progress(&self, info: &ProgressInfo) {
        lock(&self.history).push(info.clone());
    }

    fn on_epoch_end(&self, _epoch: usize, mean_loss: f64) {
        lock(&self.epoch_losses).push(mean_loss);
    }
}

/// Progress tracker that manages multiple callbacks.
#[derive(Clone, Default)]
pub struct ProgressTracker {
    callbacks: Vec<Arc<dyn ProgressCallback>>,
    start_time: Arc<Mutex<Option<Instant>>>,
}

impl ProgressTracker {
    /// Create a new progress tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a callback.
    pub fn add_callback(&mut self, callback: Arc<dyn ProgressCallback>) {
        self.callbacks.push(callback);
    }

    /// Builder form of [`ProgressTracker::add_callback`].
    pub fn with_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.add_callback(callback);
        self
    }

    /// Start tracking.
    pub fn start(&self) {
        *lock(&self.start_time) = Some(Instant::now());
        for callback in &self.callbacks {
            callback.on_start();
        }
    }

    fn elapsed(&self) -> Duration {
        lock(&self.start_time).map(|t| t.elapsed()).unwrap_or(Duration::ZERO)
    }

    /// Report one optimizer step.
    pub fn update(
        &self,
        (epoch, total_epochs): (usize, usize),
        (iteration, iterations_per_epoch): (usize, usize),
        loss: f64,
        learning_rate: f64,
    ) {
        let mut info = ProgressInfo::new(
            epoch,
            total_epochs,
            iteration,
            iterations_per_epoch,
            loss,
            self.elapsed(),
            learning_rate,
        );
        info.calculate_remaining();

        for callback in &self.callbacks {
            callback.on_progress(&info);
        }
    }

    /// Report the end of an epoch.
    pub fn epoch_end(&self, epoch: usize, mean_loss: f64) {
        for callback in &self.callbacks {
            callback.on_epoch_end(epoch, mean_loss);
        }
    }

    /// Complete tracking.
    pub fn complete(&self, total_epochs: usize, final_loss: f64, learning_rate: f64) {
        let info = ProgressInfo::new(
            total_epochs,
            total_epochs,
            0,
            0,
            final_loss,
            self.elapsed(),
            learning_rate,
        );

        for callback in &self.callbacks {
            callback.on_complete(&info);
        }
    }

    /// Report error.
    pub fn error(&self, error: &str) {
        for callback in &self.callbacks {
            callback.on_error(error);
        }
    }
}

/// Lock a mutex, recovering the data if a callback panicked while holding it.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(epoch: usize, iteration: usize, loss: f64) -> ProgressInfo {
        ProgressInfo::new(epoch, 2, iteration, 5, loss, Duration::from_secs(6), 5e-5)
    }

    #[test]
    fn test_progress_info() {
        let info = info(2, 1, 0.5);
        assert_eq!(info.global_step(), 6);
        assert_eq!(info.total_steps(), 10);
        assert_eq!(info.progress_percent(), 60.0);
    }

    #[test]
    fn test_progress_info_remaining() {
        let mut info = info(2, 1, 0.5);
        info.calculate_remaining();
        assert_eq!(info.estimated_remaining, Some(Duration::from_secs(4)));
    }

    #[test]
    fn test_history_callback() {
        let callback = HistoryCallback::new();
        callback.on_progress(&info(1, 1, 0.5));
        callback.on_progress(&info(1, 2, 0.4));
        callback.on_epoch_end(1, 0.45);

        let history = callback.get_history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].iteration, 2);
        assert_eq!(callback.losses(), vec![0.5, 0.4]);
        assert_eq!(callback.epoch_losses(), vec![0.45]);

        callback.clear();
        assert!(callback.get_history().is_empty());
    }

    #[test]
    fn test_progress_tracker_fans_out() {
        let history = Arc::new(HistoryCallback::new());
        let bar = Arc::new(ProgressBarCallback::hidden());
        let tracker = ProgressTracker::new()
            .with_callback(history.clone())
            .with_callback(bar.clone())
            .with_callback(Arc::new(ConsoleProgressCallback::default()));

        tracker.start();
        tracker.update((1, 1), (1, 2), 0.5, 0.01);
        tracker.update((1, 1), (2, 2), 0.4, 0.01);
        tracker.epoch_end(1, 0.45);
        tracker.complete(1, 0.4, 0.01);

        assert_eq!(history.losses(), vec![0.5, 0.4]);
        assert_eq!(history.epoch_losses(), vec![0.45]);
        assert_eq!(bar.position(), 2);
    }
}
