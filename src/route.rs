use crate::model::{Course, FeedEntry, INSTRUCTOR_NOTE_TAG};

/// Webhook a post is announced on: instructor notes go to the announcement
/// channel, everything else to the general feed.
pub fn route<'c>(post: &FeedEntry, course: &'c Course) -> &'c str {
    if post.has_tag(INSTRUCTOR_NOTE_TAG) {
        &course.announcement_webhook
    } else {
        &course.feed_webhook
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PostKind;

    fn course() -> Course {
        Course {
            course_id: "cs101".into(),
            piazza_id: "abc".into(),
            announcement_webhook: "https://hooks/announce".into(),
            feed_webhook: "https://hooks/feed".into(),
        }
    }

    fn post(tags: &[&str]) -> FeedEntry {
        FeedEntry {
            nr: 1,
            kind: PostKind::Note,
            subject: "s".into(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            folders: vec![],
            status: "active".into(),
        }
    }

    #[test]
    fn instructor_note_goes_to_announcements() {
        let c = course();
        assert_eq!(route(&post(&["hw1", "instructor-note"]), &c), "https://hooks/announce");
    }

    #[test]
    fn other_tags_go_to_feed() {
        let c = course();
        assert_eq!(route(&post(&[]), &c), "https://hooks/feed");
        assert_eq!(route(&post(&["instructor", "note"]), &c), "https://hooks/feed");
    }
}
