// src/crawl/task.rs
// =============================================================================
// One unit of crawl work: fetch this URL, then find what it pulls in.
//
// Tasks form a tree rooted at the seed. Ids spell out the path from the
// root: the third asset found on the root page is "0.2", the first asset
// found on that one is "0.2.0", and so on.
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlTask {
    /// Hierarchical id, unique within a round
    pub id: String,
    /// Id of the task whose page referenced this one; the root points at itself
    pub parent_id: String,
    /// Link hops from the seed (root = 0)
    pub depth: u32,
    /// Absolute URL to fetch
    pub url: String,
}

impl CrawlTask {
    pub const ROOT_ID: &'static str = "0";

    pub fn root(url: impl Into<String>) -> Self {
        Self {
            id: Self::ROOT_ID.to_string(),
            parent_id: Self::ROOT_ID.to_string(),
            depth: 0,
            url: url.into(),
        }
    }

    // `index` is the URL's position in this page's extracted list, so
    // siblings keep stable ids even when some of them were duplicates
    pub fn child(&self, index: usize, url: impl Into<String>) -> Self {
        Self {
            id: format!("{}.{}", self.id, index),
            parent_id: self.id.clone(),
            depth: self.depth + 1,
            url: url.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_is_its_own_parent() {
        let root = CrawlTask::root("http://a.com/");
        assert_eq!(root.id, "0");
        assert_eq!(root.parent_id, root.id);
        assert_eq!(root.depth, 0);
    }

    #[test]
    fn test_child_ids_follow_the_path() {
        let root = CrawlTask::root("http://a.com/");
        let child = root.child(3, "http://a.com/a.png");
        let grandchild = child.child(0, "http://a.com/b.png");

        assert_eq!(child.id, "0.3");
        assert_eq!(child.parent_id, "0");
        assert_eq!(child.depth, 1);

        assert_eq!(grandchild.id, "0.3.0");
        assert_eq!(grandchild.parent_id, "0.3");
        assert_eq!(grandchild.depth, 2);
    }
}
