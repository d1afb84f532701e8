//! Candidate pools for the home page feeds.

use rand::Rng;

use super::posts::{summary_from_row, EDITION_EXPR, SUMMARY_COLUMNS};
use super::{PostSummary, Result, Store};
use crate::feed::{self, FeedSource, HomeFeeds};

impl Store {
    fn summaries(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<PostSummary>> {
        let mut stmt = self.conn().prepare_cached(sql)?;
        let posts = stmt
            .query_map(params, summary_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(posts)
    }

    /// Compose the home page feeds for the current edition.
    pub fn home_feeds<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<HomeFeeds> {
        let current = self.current_edition()?;
        feed::compose(self, current, rng)
    }
}

impl FeedSource for Store {
    fn edition_pool(&self, edition: i64, limit: u32) -> Result<Vec<PostSummary>> {
        self.summaries(
            &format!(
                "SELECT {SUMMARY_COLUMNS}
                 FROM post p
                 WHERE p.deleted = 0 AND {EDITION_EXPR} = ?1
                 ORDER BY RANDOM()
                 LIMIT ?2"
            ),
            rusqlite::params![edition, limit],
        )
    }

    fn slept_on_pool(&self, max_views: i64, max_comments: i64, limit: u32) -> Result<Vec<PostSummary>> {
        self.summaries(
            &format!(
                r#"SELECT {SUMMARY_COLUMNS}
                   FROM post p
                   LEFT JOIN (
                       SELECT "for" AS post_id, COUNT(*) AS comments
                       FROM comment
                       GROUP BY "for"
                   ) c ON c.post_id = p.id
                   WHERE p.deleted = 0
                     AND (p.views <= ?1 OR IFNULL(c.comments, 0) <= ?2)
                   ORDER BY RANDOM()
                   LIMIT ?3"#
            ),
            rusqlite::params![max_views, max_comments, limit],
        )
    }

    fn latest_pool(&self, limit: u32) -> Result<Vec<PostSummary>> {
        self.summaries(
            &format!(
                "SELECT {SUMMARY_COLUMNS}
                 FROM post p
                 WHERE p.deleted = 0
                 ORDER BY p.updated DESC, p.id DESC
                 LIMIT ?1"
            ),
            [limit],
        )
    }

    fn most_viewed_pool(&self, limit: u32) -> Result<Vec<PostSummary>> {
        self.summaries(
            &format!(
                "SELECT {SUMMARY_COLUMNS}
                 FROM post p
                 WHERE p.deleted = 0
                 ORDER BY p.views DESC, p.id DESC
                 LIMIT ?1"
            ),
            [limit],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::NewPost;
    use rand::{rngs::StdRng, SeedableRng};
    use std::collections::HashSet;

    fn add(store: &Store, edition: i64) -> String {
        store
            .create_post(&NewPost {
                content: "words".to_string(),
                edition,
                ..Default::default()
            })
            .unwrap()
    }

    #[test]
    fn test_pools_skip_deleted_posts() {
        let store = Store::open_in_memory().unwrap();
        let kept = add(&store, 0);
        let gone = add(&store, 0);
        store.delete_post(&gone).unwrap();

        for pool in [
            store.latest_pool(20).unwrap(),
            store.most_viewed_pool(20).unwrap(),
            store.slept_on_pool(20, 3, 15).unwrap(),
            store.edition_pool(0, 10).unwrap(),
        ] {
            let ids: Vec<_> = pool.iter().map(|p| p.id.as_str()).collect();
            assert_eq!(ids, vec![kept.as_str()]);
        }
    }

    #[test]
    fn test_slept_on_counts_comments() {
        let store = Store::open_in_memory().unwrap();
        let busy = add(&store, 0);
        let quiet = add(&store, 0);

        for _ in 0..4 {
            store.create_comment(&busy, "nice", None).unwrap();
        }
        let row = crate::hashid::decode(&busy).unwrap() as i64;
        store
            .conn()
            .execute("UPDATE post SET views = 30 WHERE id = ?1", [row])
            .unwrap();

        let ids: Vec<String> = store
            .slept_on_pool(20, 3, 15)
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec![quiet.clone()]);

        // Either condition is enough.
        assert_eq!(store.slept_on_pool(20, 4, 15).unwrap().len(), 2);
        assert_eq!(store.slept_on_pool(30, 0, 15).unwrap().len(), 2);
    }

    #[test]
    fn test_most_viewed_order() {
        let store = Store::open_in_memory().unwrap();
        let a = add(&store, 0);
        let b = add(&store, 0);
        store.add_view(&b).unwrap();

        let ids: Vec<String> = store
            .most_viewed_pool(20)
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec![b, a]);
    }

    #[test]
    fn test_home_feeds_from_store() {
        let store = Store::open_in_memory().unwrap();
        let edition = store.create_edition("Week 1", "").unwrap();
        for i in 0..30 {
            add(&store, if i < 7 { edition.id } else { 0 });
        }

        let mut rng = StdRng::seed_from_u64(3);
        let feeds = store.home_feeds(&mut rng).unwrap();

        assert_eq!(feeds.current_edition, edition.id);
        assert_eq!(feeds.edition.len(), 5);
        assert!(feeds.edition.iter().all(|p| p.edition() == edition.id));

        let mut seen = HashSet::new();
        for post in feeds
            .edition
            .iter()
            .chain(&feeds.slept_on)
            .chain(&feeds.latest)
            .chain(&feeds.most_viewed)
        {
            assert!(seen.insert(post.id.clone()));
        }
        assert_eq!(seen.len(), 20);
    }
}
