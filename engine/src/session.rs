//! An editing session: a [`PageStore`] edited on the caller's thread, with
//! opening, thumbnail rendering and saving done by a background worker. Results
//! reach the store when the caller collects them.

use crate::adapter::{DocumentAdapter, SourceInfo, Thumbnail};
use crate::config::Config;
use crate::edit::{Edit, EditOutcome};
use crate::error::{EditError, Result};
use crate::page::{PageId, Rotation};
use crate::planner::{self, PlanMode, SavePlan};
use crate::save::{SavePipeline, SaveReport};
use crate::store::PageStore;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

#[derive(Debug)]
pub enum SessionEvent {
    Opened { page_count: usize },
    OpenFailed(EditError),
    Inserted(Vec<PageId>),
    InsertFailed(EditError),
    Thumbnail { page: PageId, thumbnail: Thumbnail },
    ThumbnailFailed { page: PageId, error: EditError },
    Saved(SaveReport),
    SaveFailed(EditError),
}

enum Job {
    Open {
        path: PathBuf,
    },
    Insert {
        position: usize,
        path: PathBuf,
        pages: Option<Vec<usize>>,
    },
    Thumbnail {
        id: PageId,
        path: PathBuf,
        rotation: Rotation,
        generation: u64,
    },
    Save {
        plan: SavePlan,
        destination: PathBuf,
        compress: bool,
    },
}

enum Done {
    Opened {
        path: PathBuf,
        result: Result<SourceInfo>,
    },
    Inserted {
        position: usize,
        path: PathBuf,
        pages: Option<Vec<usize>>,
        result: Result<SourceInfo>,
    },
    Thumbnail {
        id: PageId,
        generation: u64,
        result: Result<Thumbnail>,
    },
    Saved(Result<SaveReport>),
}

pub struct Session<A: DocumentAdapter + Send + Sync + 'static> {
    adapter: Arc<A>,
    config: Config,
    store: PageStore,
    jobs: Option<Sender<Job>>,
    done: Receiver<Done>,
    worker: Option<JoinHandle<()>>,
    backlog: VecDeque<SessionEvent>,
    // Latest thumbnail request per page; older results are dropped.
    generations: HashMap<PageId, u64>,
    next_generation: u64,
    opening: bool,
    inserting: usize,
    saving: bool,
}

impl<A: DocumentAdapter + Send + Sync + 'static> Session<A> {
    pub fn new(adapter: A, config: Config) -> Result<Self> {
        let adapter = Arc::new(adapter);
        let (jobs, job_receiver) = mpsc::channel();
        let (done_sender, done) = mpsc::channel();

        let worker_adapter = adapter.clone();
        let worker_config = config.clone();
        let worker = thread::Builder::new()
            .name("pagewright-worker".into())
            .spawn(move || work(&*worker_adapter, &worker_config, job_receiver, done_sender))
            .map_err(|e| EditError::Worker(e.to_string()))?;

        Ok(Self {
            adapter,
            config,
            store: PageStore::new(),
            jobs: Some(jobs),
            done,
            worker: Some(worker),
            backlog: VecDeque::new(),
            generations: HashMap::new(),
            next_generation: 0,
            opening: false,
            inserting: 0,
            saving: false,
        })
    }

    pub fn store(&self) -> &PageStore {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_saving(&self) -> bool {
        self.saving
    }

    pub fn is_loading(&self) -> bool {
        self.opening || self.inserting > 0
    }

    /// Starts opening `path` in the background. The store is replaced once
    /// [`SessionEvent::Opened`] is collected.
    pub fn open(&mut self, path: &Path) -> Result<()> {
        self.store.ensure_editable()?;
        self.send(Job::Open {
            path: path.to_path_buf(),
        })?;
        self.opening = true;
        Ok(())
    }

    /// Opens `path` and waits for it. Other events arriving meanwhile stay
    /// queued for [`Session::poll_events`].
    pub fn open_blocking(&mut self, path: &Path) -> Result<usize> {
        self.open(path)?;

        let mut skipped = VecDeque::new();
        let result = loop {
            match self.next_event()? {
                SessionEvent::Opened { page_count } => break Ok(page_count),
                SessionEvent::OpenFailed(e) => break Err(e),
                other => skipped.push_back(other),
            }
        };

        self.backlog.append(&mut skipped);
        result
    }

    /// Applies an edit to the store. Inserting opens the other document in
    /// the background and returns [`EditOutcome::Pending`].
    pub fn apply(&mut self, edit: &Edit) -> Result<EditOutcome> {
        if let Edit::Insert {
            position,
            source,
            pages,
        } = edit
        {
            self.store.ensure_open()?;
            self.store.check_position(*position)?;
            self.send(Job::Insert {
                position: *position,
                path: source.clone(),
                pages: pages.clone(),
            })?;
            self.inserting += 1;
            return Ok(EditOutcome::Pending);
        }

        let outcome = self.store.apply(&*self.adapter, edit)?;
        if let EditOutcome::Rotated(ids) = &outcome {
            self.request_thumbnails(ids);
        }
        Ok(outcome)
    }

    /// Plans the save on this thread and hands the plan to the worker. Edits
    /// are refused until [`SessionEvent::Saved`] or
    /// [`SessionEvent::SaveFailed`] is collected. Returns the number of pages
    /// that will be written.
    pub fn begin_save(&mut self, mode: &PlanMode, destination: &Path) -> Result<usize> {
        self.begin_save_with(mode, destination, false)
    }

    /// Same as [`Session::begin_save`], compressing the result when `compress`
    /// is set.
    pub fn begin_save_with(
        &mut self,
        mode: &PlanMode,
        destination: &Path,
        compress: bool,
    ) -> Result<usize> {
        self.store.ensure_editable()?;
        if self.is_loading() {
            return Err(EditError::Loading);
        }

        let plan = planner::plan(&self.store, mode)?;
        let page_count = plan.len();

        self.store.check_out()?;
        let sent = self.send(Job::Save {
            plan,
            destination: destination.to_path_buf(),
            compress,
        });
        if let Err(e) = sent {
            self.store.check_in();
            return Err(e);
        }

        self.saving = true;
        log::info!("Saving {} pages to {}", page_count, destination.display());
        Ok(page_count)
    }

    /// Collects whatever the worker finished, without waiting.
    pub fn poll_events(&mut self) -> Vec<SessionEvent> {
        let mut events = self.backlog.drain(..).collect::<Vec<_>>();

        loop {
            match self.done.try_recv() {
                Ok(done) => events.extend(self.handle(done)),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    log::error!("Background worker is gone");
                    break;
                }
            }
        }

        events
    }

    /// Waits for the next event.
    pub fn wait_event(&mut self) -> Result<SessionEvent> {
        match self.backlog.pop_front() {
            Some(event) => Ok(event),
            None => self.next_event(),
        }
    }

    fn next_event(&mut self) -> Result<SessionEvent> {
        loop {
            let done = self
                .done
                .recv()
                .map_err(|_| EditError::Worker("no more results".into()))?;
            if let Some(event) = self.handle(done) {
                return Ok(event);
            }
        }
    }

    fn handle(&mut self, done: Done) -> Option<SessionEvent> {
        match done {
            Done::Opened { path, result } => {
                self.opening = false;
                match result {
                    Ok(info) => {
                        let page_count = self.store.install(&path, info);
                        self.generations.clear();
                        let ids = self.store.order().to_vec();
                        self.request_thumbnails(&ids);
                        Some(SessionEvent::Opened { page_count })
                    }
                    Err(e) => {
                        log::error!("{}", e);
                        self.store.reset();
                        Some(SessionEvent::OpenFailed(e))
                    }
                }
            }
            Done::Inserted {
                position,
                path,
                pages,
                result,
            } => {
                self.inserting = self.inserting.saturating_sub(1);
                let inserted = result.and_then(|info| {
                    self.store
                        .insert_at(position, &path, info, pages.as_deref())
                });
                match inserted {
                    Ok(ids) => {
                        self.request_thumbnails(&ids);
                        Some(SessionEvent::Inserted(ids))
                    }
                    Err(e) => {
                        log::error!("{}", e);
                        Some(SessionEvent::InsertFailed(e))
                    }
                }
            }
            Done::Thumbnail {
                id,
                generation,
                result,
            } => {
                if self.generations.get(&id) != Some(&generation) {
                    log::debug!("Dropping stale thumbnail of page {}", id);
                    return None;
                }
                self.generations.remove(&id);
                match result {
                    Ok(thumbnail) => Some(SessionEvent::Thumbnail {
                        page: id,
                        thumbnail,
                    }),
                    Err(error) => Some(SessionEvent::ThumbnailFailed { page: id, error }),
                }
            }
            Done::Saved(result) => {
                self.saving = false;
                match result {
                    Ok(report) => {
                        self.store.reset();
                        self.generations.clear();
                        Some(SessionEvent::Saved(report))
                    }
                    Err(e) => {
                        self.store.check_in();
                        Some(SessionEvent::SaveFailed(e))
                    }
                }
            }
        }
    }

    fn request_thumbnails(&mut self, ids: &[PageId]) {
        if let Err(e) = self.refresh_thumbnails(ids) {
            log::warn!("Couldn't request thumbnails: {}", e);
        }
    }

    fn refresh_thumbnails(&mut self, ids: &[PageId]) -> Result<()> {
        if !self.config.render_thumbnails {
            return Ok(());
        }

        for id in ids.iter() {
            // Blank pages have nothing to render.
            let Some(path) = self.store.source(id.source).and_then(|s| s.path()) else {
                continue;
            };

            self.next_generation += 1;
            self.generations.insert(*id, self.next_generation);
            let job = Job::Thumbnail {
                id: *id,
                path: path.to_path_buf(),
                rotation: self.store.delta(*id),
                generation: self.next_generation,
            };
            self.send(job)?;
        }
        Ok(())
    }

    fn send(&self, job: Job) -> Result<()> {
        self.jobs
            .as_ref()
            .ok_or_else(|| EditError::Worker("the session is closed".into()))?
            .send(job)
            .map_err(|_| EditError::Worker("the worker stopped".into()))
    }
}

impl<A: DocumentAdapter + Send + Sync + 'static> Drop for Session<A> {
    fn drop(&mut self) {
        // Closing the channel ends the worker loop.
        self.jobs.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("Background worker panicked");
            }
        }
    }
}

fn work<A: DocumentAdapter + ?Sized>(
    adapter: &A,
    config: &Config,
    jobs: Receiver<Job>,
    done: Sender<Done>,
) {
    for job in jobs.iter() {
        let result = match job {
            Job::Open { path } => {
                let result = adapter.open(&path);
                Done::Opened { path, result }
            }
            Job::Insert {
                position,
                path,
                pages,
            } => {
                let result = adapter.open(&path);
                Done::Inserted {
                    position,
                    path,
                    pages,
                    result,
                }
            }
            Job::Thumbnail {
                id,
                path,
                rotation,
                generation,
            } => {
                let result =
                    adapter.render_thumbnail(&path, id.page, config.thumbnail_scale, rotation);
                Done::Thumbnail {
                    id,
                    generation,
                    result,
                }
            }
            Job::Save {
                plan,
                destination,
                compress,
            } => {
                let result = SavePipeline::new(adapter)
                    .with_temp_dir(config.temp_dir.clone())
                    .with_compression(compress)
                    .execute(&plan, &destination);
                Done::Saved(result)
            }
        };

        if done.send(result).is_err() {
            break;
        }
    }

    log::debug!("Background worker done");
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::adapter::PdfAdapter;
    use crate::edit::Direction;
    use crate::fixtures;

    fn session() -> Session<PdfAdapter> {
        let config = Config {
            render_thumbnails: false,
            ..Config::default()
        };
        Session::new(PdfAdapter::from_config(&config), config).unwrap()
    }

    #[test]
    fn test_open_edit_and_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixtures::write_pdf(dir.path(), "four.pdf", &[0, 0, 0, 0]);
        let destination = dir.path().join("saved.pdf");
        let mut session = session();

        assert_eq!(4, session.open_blocking(&path).unwrap());

        session.apply(&Edit::Toggle { page: PageId::host(3) }).unwrap();
        session
            .apply(&Edit::MoveSelected {
                direction: Direction::Up,
            })
            .unwrap();
        let outcome = session
            .apply(&Edit::RotateSelected { degrees: 90 })
            .unwrap();
        assert_eq!(EditOutcome::Rotated(vec![PageId::host(3)]), outcome);

        assert_eq!(4, session.begin_save(&PlanMode::KeepAll, &destination).unwrap());
        assert!(session.is_saving());

        match session.wait_event().unwrap() {
            SessionEvent::Saved(report) => assert_eq!(4, report.pages_written),
            other => panic!("Unexpected event {:?}", other),
        }

        assert!(!session.is_saving());
        assert!(!session.store().is_open());
        assert_eq!(
            vec!["Page 1", "Page 2", "Page 4", "Page 3"],
            fixtures::page_labels(&destination)
        );
        assert_eq!(vec![0, 0, 90, 0], fixtures::page_rotations(&destination));
    }

    #[test]
    fn test_edits_refused_during_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixtures::write_pdf(dir.path(), "basic.pdf", &[0, 0]);
        let destination = dir.path().join("saved.pdf");
        let mut session = session();
        session.open_blocking(&path).unwrap();

        session.begin_save(&PlanMode::KeepAll, &destination).unwrap();

        let result = session.apply(&Edit::SelectAll);
        assert!(matches!(result, Err(EditError::SaveInFlight)));
        let result = session.begin_save(&PlanMode::KeepAll, &destination);
        assert!(matches!(result, Err(EditError::SaveInFlight)));
        let result = session.open(&path);
        assert!(matches!(result, Err(EditError::SaveInFlight)));

        assert!(matches!(
            session.wait_event().unwrap(),
            SessionEvent::Saved(_)
        ));
    }

    #[test]
    fn test_failed_save_keeps_edits() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixtures::write_pdf(dir.path(), "basic.pdf", &[0, 0]);
        let destination = dir.path().join("missing").join("saved.pdf");
        let mut session = session();
        session.open_blocking(&path).unwrap();
        session
            .apply(&Edit::Rotate {
                pages: vec![PageId::host(1)],
                degrees: -90,
            })
            .unwrap();

        session.begin_save(&PlanMode::KeepAll, &destination).unwrap();

        assert!(matches!(
            session.wait_event().unwrap(),
            SessionEvent::SaveFailed(EditError::AdapterWriteFailure { .. })
        ));
        assert!(!destination.exists());
        assert_eq!(Rotation::R270, session.store().delta(PageId::host(1)));

        // Editing works again.
        session.apply(&Edit::SelectAll).unwrap();
    }

    #[test]
    fn test_open_failure_empties_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixtures::write_pdf(dir.path(), "basic.pdf", &[0, 0]);
        let mut session = session();
        session.open_blocking(&path).unwrap();

        let result = session.open_blocking(&dir.path().join("potato.pdf"));

        assert!(matches!(result, Err(EditError::SourceUnreadable { .. })));
        assert!(!session.store().is_open());
    }

    #[test]
    fn test_insert_in_background() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixtures::write_pdf(dir.path(), "basic.pdf", &[0, 0]);
        let extra = fixtures::write_pdf(dir.path(), "extra.pdf", &[180, 0, 0]);
        let mut session = session();
        session.open_blocking(&path).unwrap();

        let outcome = session
            .apply(&Edit::Insert {
                position: 1,
                source: extra,
                pages: Some(vec![0, 2]),
            })
            .unwrap();
        assert_eq!(EditOutcome::Pending, outcome);
        assert!(session.is_loading());

        let result = session.begin_save(&PlanMode::KeepAll, &dir.path().join("saved.pdf"));
        assert!(matches!(result, Err(EditError::Loading)));

        match session.wait_event().unwrap() {
            SessionEvent::Inserted(ids) => {
                assert_eq!(vec![PageId::new(1, 0), PageId::new(1, 2)], ids)
            }
            other => panic!("Unexpected event {:?}", other),
        }
        assert!(!session.is_loading());
        assert_eq!(4, session.store().len());
        assert_eq!(
            Rotation::R180,
            session.store().original_rotation(PageId::new(1, 0))
        );
    }

    #[test]
    fn test_insert_rejects_bad_position_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixtures::write_pdf(dir.path(), "basic.pdf", &[0]);
        let mut session = session();
        session.open_blocking(&path).unwrap();

        let result = session.apply(&Edit::Insert {
            position: 5,
            source: path.clone(),
            pages: None,
        });
        assert!(matches!(result, Err(EditError::InvalidPosition { .. })));
        assert!(!session.is_loading());
    }

    #[test]
    fn test_blank_page_and_compressed_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixtures::write_pdf(dir.path(), "basic.pdf", &[0, 0]);
        let destination = dir.path().join("saved.pdf");
        let mut session = session();
        session.open_blocking(&path).unwrap();

        let outcome = session.apply(&Edit::InsertBlank { position: 0 }).unwrap();
        assert_eq!(EditOutcome::Inserted(vec![PageId::new(1, 0)]), outcome);
        assert!(!session.is_loading());

        assert_eq!(
            3,
            session
                .begin_save_with(&PlanMode::KeepAll, &destination, true)
                .unwrap()
        );
        assert!(matches!(
            session.wait_event().unwrap(),
            SessionEvent::Saved(_)
        ));
        assert_eq!(vec![0, 0, 0], fixtures::page_rotations(&destination));
    }

    #[test]
    fn test_events_skipped_while_opening_keep_their_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixtures::write_pdf(dir.path(), "basic.pdf", &[0]);
        let extra = fixtures::write_pdf(dir.path(), "extra.pdf", &[0, 0]);
        let mut session = session();
        session.open_blocking(&path).unwrap();

        session.backlog.push_back(SessionEvent::Opened { page_count: 9 });
        session
            .apply(&Edit::Insert {
                position: 0,
                source: extra,
                pages: None,
            })
            .unwrap();
        session.open_blocking(&path).unwrap();

        let events = session.poll_events();
        assert_eq!(2, events.len());
        assert!(matches!(events[0], SessionEvent::Opened { page_count: 9 }));
        assert!(matches!(events[1], SessionEvent::Inserted(_)));
    }

    #[test]
    fn test_stale_thumbnails_are_dropped() {
        let mut session = session();
        let page = PageId::host(0);
        session.generations.insert(page, 2);

        let stale = Done::Thumbnail {
            id: page,
            generation: 1,
            result: Ok(Thumbnail::new(vec![1], (1, 1))),
        };
        assert!(session.handle(stale).is_none());

        let latest = Done::Thumbnail {
            id: page,
            generation: 2,
            result: Ok(Thumbnail::new(vec![2], (1, 1))),
        };
        match session.handle(latest) {
            Some(SessionEvent::Thumbnail { page: id, thumbnail }) => {
                assert_eq!(page, id);
                assert_eq!(&[2], thumbnail.jpeg());
            }
            other => panic!("Unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_poll_without_work() {
        let mut session = session();
        assert!(session.poll_events().is_empty());
    }
}
