// tests/concurrency.rs
//
// Очередь оркестратора:
//  - операции над одним слотом выполняются строго в порядке подачи;
//  - разные слоты обслуживаются параллельно;
//  - отмена в очереди срабатывает сразу, отмена "в полёте" — на границе стадии,
//    прежнее содержимое слота при этом не трогается;
//  - OpHandle можно дождаться через .await.

use anyhow::Result;
use std::fs;
use std::future::Future;
use std::path::PathBuf;
use std::pin::pin;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Wake, Waker};
use std::thread;
use std::time::Duration;

use SaveGame::{
    DecodeCx, EncodeCx, Migrator, OpState, RecordBuilder, RecordReader, SaveConfig, SaveError,
    SaveOrchestrator, SaveResult, SaveType, Saveable, SlotId, Value,
};

const PATIENCE: Duration = Duration::from_secs(10);

/// Сохраняемое значение с "датчиками": лог сериализаций и ручной затвор.
#[derive(Debug, Default)]
struct Marker {
    n: u32,
    log: Option<Arc<Mutex<Vec<u32>>>>,
    started: Option<Sender<u32>>,
    release: Option<Receiver<()>>,
}

impl Marker {
    fn plain(n: u32) -> Self {
        Marker {
            n,
            ..Default::default()
        }
    }

    fn logged(n: u32, log: &Arc<Mutex<Vec<u32>>>) -> Self {
        Marker {
            n,
            log: Some(Arc::clone(log)),
            ..Default::default()
        }
    }

    /// Сериализация сообщит о старте и встанет до сигнала по возвращённому Sender.
    fn gated(n: u32, started: &Sender<u32>) -> (Self, Sender<()>) {
        let (tx, rx) = mpsc::channel();
        let p = Marker {
            n,
            started: Some(started.clone()),
            release: Some(rx),
            ..Default::default()
        };
        (p, tx)
    }
}

impl Saveable for Marker {
    fn to_value(&self, cx: &mut EncodeCx) -> SaveResult<Value> {
        if let Some(tx) = &self.started {
            let _ = tx.send(self.n);
        }
        if let Some(rx) = &self.release {
            let _ = rx.recv_timeout(PATIENCE);
        }
        if let Some(log) = &self.log {
            log.lock().unwrap().push(self.n);
        }
        Ok(RecordBuilder::new(cx).field("n", &self.n)?.build())
    }
    fn from_value(v: &Value, cx: &mut DecodeCx<'_>) -> SaveResult<Self> {
        let r = RecordReader::new("Marker", v)?;
        Ok(Marker::plain(r.req("n", cx)?))
    }
}

impl SaveType for Marker {
    const TYPE_NAME: &'static str = "Marker";
    const SCHEMA_VERSION: u32 = 1;
}

fn open(root: &PathBuf, workers: usize) -> Result<SaveOrchestrator> {
    let cfg = SaveConfig::default()
        .with_data_fsync(false)
        .with_workers(workers);
    Ok(SaveOrchestrator::open_with_config(root, cfg, Migrator::empty())?)
}

#[test]
fn same_slot_saves_complete_in_submission_order() -> Result<()> {
    let root = unique_root("fifo");
    let orch = open(&root, 4)?;
    let slot = SlotId::named("race")?;
    let log = Arc::new(Mutex::new(Vec::new()));

    let handles: Vec<_> = (0..40)
        .map(|n| orch.save(slot.clone(), Marker::logged(n, &log)))
        .collect();
    for h in handles {
        h.wait()?;
    }

    assert_eq!(*log.lock().unwrap(), (0..40).collect::<Vec<u32>>());
    let last: Marker = orch.load(slot).wait()?;
    assert_eq!(last.n, 39);

    drop(orch);
    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn different_slots_run_concurrently() -> Result<()> {
    let root = unique_root("parallel");
    let orch = open(&root, 2)?;
    let (started_tx, started_rx) = mpsc::channel();

    let (a, release_a) = Marker::gated(1, &started_tx);
    let (b, release_b) = Marker::gated(2, &started_tx);
    let ha = orch.save(SlotId::Index(1), a);
    let hb = orch.save(SlotId::Index(2), b);

    // Обе сериализации должны стартовать, пока ни одна не отпущена.
    let mut seen = vec![
        started_rx.recv_timeout(PATIENCE)?,
        started_rx.recv_timeout(PATIENCE)?,
    ];
    seen.sort();
    assert_eq!(seen, vec![1, 2]);
    assert_eq!(ha.state(), OpState::Serializing);
    assert_eq!(hb.state(), OpState::Serializing);

    release_a.send(())?;
    release_b.send(())?;
    ha.wait()?;
    hb.wait()?;
    assert_eq!(orch.list()?.len(), 2);

    drop(orch);
    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn cancel_while_queued_resolves_at_once() -> Result<()> {
    let root = unique_root("cancel-queued");
    let orch = open(&root, 2)?;
    let slot = SlotId::named("busy")?;
    let (started_tx, started_rx) = mpsc::channel();

    let (first, release) = Marker::gated(1, &started_tx);
    let h1 = orch.save(slot.clone(), first);
    started_rx.recv_timeout(PATIENCE)?;

    let h2 = orch.save(slot.clone(), Marker::plain(2));
    assert_eq!(h2.state(), OpState::Pending);
    assert_eq!(orch.pending(), 1);
    assert!(h2.cancel());
    assert_eq!(h2.state(), OpState::Cancelled);

    release.send(())?;
    h1.wait()?;

    let err = h2.wait().expect_err("cancelled while queued");
    assert!(err.is_cancelled());
    assert_eq!(err.stage, OpState::Pending);

    let p: Marker = orch.load(slot).wait()?;
    assert_eq!(p.n, 1);

    drop(orch);
    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn cancel_in_flight_keeps_previous_content() -> Result<()> {
    let root = unique_root("cancel-flight");
    let orch = open(&root, 1)?;
    let slot = SlotId::named("keep")?;
    orch.save(slot.clone(), Marker::plain(7)).wait()?;

    let (started_tx, started_rx) = mpsc::channel();
    let (next, release) = Marker::gated(8, &started_tx);
    let h = orch.save(slot.clone(), next);
    started_rx.recv_timeout(PATIENCE)?;

    // Уже выполняется: cancel() только ставит флаг.
    assert!(!h.cancel());
    release.send(())?;

    let err = h.wait().expect_err("cancelled before promote");
    assert!(matches!(err.kind, SaveError::Cancelled));
    assert_eq!(err.stage, OpState::Persisting);

    let p: Marker = orch.load(slot.clone()).wait()?;
    assert_eq!(p.n, 7);
    assert!(!orch.slots().staging_path(&slot).exists());

    drop(orch);
    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn handles_can_be_awaited() -> Result<()> {
    let root = unique_root("await");
    let orch = open(&root, 2)?;
    let slot = SlotId::Index(3);

    let got = block_on(async {
        orch.save(slot.clone(), Marker::plain(42)).await?;
        let p: Marker = orch.load(slot.clone()).await?;
        orch.delete(slot.clone()).await?;
        Ok::<_, anyhow::Error>(p)
    })?;
    assert_eq!(got.n, 42);

    let missing = block_on(orch.load::<Marker>(slot));
    assert!(matches!(
        missing.map_err(|e| e.kind),
        Err(SaveError::SlotNotFound(_))
    ));

    drop(orch);
    let _ = fs::remove_dir_all(&root);
    Ok(())
}

struct ThreadWaker(thread::Thread);

impl Wake for ThreadWaker {
    fn wake(self: Arc<Self>) {
        self.0.unpark();
    }
}

fn block_on<F: Future>(fut: F) -> F::Output {
    let mut fut = pin!(fut);
    let waker = Waker::from(Arc::new(ThreadWaker(thread::current())));
    let mut cx = Context::from_waker(&waker);
    loop {
        match fut.as_mut().poll(&mut cx) {
            Poll::Ready(v) => return v,
            Poll::Pending => thread::park_timeout(Duration::from_millis(50)),
        }
    }
}

fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    std::env::temp_dir().join(format!("sgtest-conc-{prefix}-{pid}-{t}"))
}
