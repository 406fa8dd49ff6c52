//! Per-trigger orchestration: detect new posts for each course and announce
//! them one by one.

use reqwest::Url;
use tracing::{info, instrument, warn};

use crate::compose::{compose, post_url};
use crate::config::Config;
use crate::db::WatermarkStore;
use crate::detect::{detect_changes, ChangeSet};
use crate::discord::DeliveryTransport;
use crate::error::RelayError;
use crate::model::{Course, FeedEntry};
use crate::normalize::Normalizer;
use crate::piazza::{AuthorSource, DetailSource, FeedSource, PiazzaClient};
use crate::route::route;

#[derive(Debug)]
pub enum CourseOutcome {
    /// No eligible posts; the watermark was not written.
    NoOp,
    Processed { delivered: usize, failed: usize },
    Aborted(RelayError),
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub courses: Vec<(String, CourseOutcome)>,
}

impl RunReport {
    pub fn outcome(&self, course_id: &str) -> Option<&CourseOutcome> {
        self.courses
            .iter()
            .find(|(id, _)| id == course_id)
            .map(|(_, outcome)| outcome)
    }

    pub fn delivered(&self) -> usize {
        self.courses
            .iter()
            .map(|(_, outcome)| match outcome {
                CourseOutcome::Processed { delivered, .. } => *delivered,
                _ => 0,
            })
            .sum()
    }
}

/// Collaborators for one run. Courses and posts are handled strictly in
/// sequence; nothing here is shared across runs except the watermark store.
pub struct Pipeline<'a> {
    pub feed: &'a dyn FeedSource,
    pub details: &'a dyn DetailSource,
    pub authors: &'a dyn AuthorSource,
    pub store: &'a dyn WatermarkStore,
    pub transport: &'a dyn DeliveryTransport,
    pub normalizer: &'a Normalizer,
}

impl<'a> Pipeline<'a> {
    pub async fn run(&self, courses: &[Course]) -> RunReport {
        let mut report = RunReport::default();
        for course in courses {
            let outcome = self.run_course(course).await;
            match &outcome {
                CourseOutcome::NoOp => info!(course_id = %course.course_id, "no new posts"),
                CourseOutcome::Processed { delivered, failed } => info!(
                    course_id = %course.course_id,
                    delivered, failed, "course processed"
                ),
                CourseOutcome::Aborted(err) => warn!(
                    course_id = %course.course_id,
                    kind = err.kind(),
                    error = %err,
                    "course aborted"
                ),
            }
            report.courses.push((course.course_id.clone(), outcome));
        }
        report
    }

    #[instrument(skip_all, fields(course_id = %course.course_id))]
    pub async fn run_course(&self, course: &Course) -> CourseOutcome {
        let feed = match self.feed.fetch_feed(&course.piazza_id).await {
            Ok(feed) => feed,
            Err(err) => return CourseOutcome::Aborted(RelayError::FeedFetch(err)),
        };
        let watermark = match self.store.get(&course.course_id).await {
            Ok(stored) => stored.unwrap_or(0),
            Err(err) => return CourseOutcome::Aborted(RelayError::WatermarkStore(err)),
        };

        let (new_posts, next_watermark) = match detect_changes(&feed, watermark) {
            ChangeSet::NoOp => return CourseOutcome::NoOp,
            ChangeSet::Changes {
                new_posts,
                next_watermark,
            } => (new_posts, next_watermark),
        };

        // Advance before delivering: a post that fails below is not retried.
        if let Err(err) = self.store.put(&course.course_id, next_watermark).await {
            return CourseOutcome::Aborted(RelayError::WatermarkStore(err));
        }
        info!(
            watermark,
            next_watermark,
            new = new_posts.len(),
            "watermark advanced"
        );

        let mut delivered = 0;
        let mut failed = 0;
        for post in &new_posts {
            match self.process_post(course, post).await {
                Ok(()) => {
                    delivered += 1;
                    info!(nr = post.nr, "post announced");
                }
                Err(err) => {
                    failed += 1;
                    warn!(nr = post.nr, kind = err.kind(), error = %err, "post skipped");
                }
            }
        }
        CourseOutcome::Processed { delivered, failed }
    }

    async fn process_post(&self, course: &Course, post: &FeedEntry) -> Result<(), RelayError> {
        let nr = post.nr;
        let detail = self
            .details
            .fetch_detail(&course.piazza_id, nr)
            .await
            .map_err(|source| RelayError::DetailFetch { nr, source })?;

        let author = match &detail.author {
            Some(uid) => Some(
                self.authors
                    .fetch_author(&course.piazza_id, uid)
                    .await
                    .map_err(|source| RelayError::AuthorFetch { nr, source })?,
            ),
            None => None,
        };

        let normalized = self
            .normalizer
            .normalize(&detail.body)
            .map_err(|source| RelayError::ContentParse { nr, source })?;

        let url = post_url(self.normalizer.origin().as_str(), &course.piazza_id, nr);
        let message = compose(post, &detail, &normalized, author.as_deref(), &url);
        let destination = route(post, course);

        self.transport
            .deliver(destination, &message)
            .await
            .map_err(|source| RelayError::Delivery { nr, source })
    }
}

/// One scheduled trigger: sign in, then run every configured course.
#[instrument(skip_all)]
pub async fn run_trigger(
    cfg: &Config,
    store: &dyn WatermarkStore,
    transport: &dyn DeliveryTransport,
) -> Result<RunReport, RelayError> {
    let base_url = Url::parse(&cfg.piazza.base_url)
        .map_err(|err| RelayError::Login(anyhow::anyhow!("invalid base URL: {err}")))?;
    let client = PiazzaClient::new(base_url.clone()).map_err(RelayError::Login)?;
    let session = client
        .login(&cfg.piazza.email, &cfg.piazza.password)
        .await
        .map_err(RelayError::Login)?
        .with_feed_limit(cfg.piazza.feed_limit);
    let normalizer = Normalizer::piazza(base_url);

    let pipeline = Pipeline {
        feed: &session,
        details: &session,
        authors: &session,
        store,
        transport,
        normalizer: &normalizer,
    };
    Ok(pipeline.run(&cfg.courses).await)
}
