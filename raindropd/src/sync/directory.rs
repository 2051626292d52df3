use std::collections::{HashMap, HashSet, VecDeque};

use raindrop_core::{Collection, RaindropClient};

use super::engine::EngineError;

/// One remote collection as tracked for the current run.
#[derive(Debug, Clone)]
pub struct CollectionRecord {
    pub title: String,
    pub parent_id: Option<String>,
}

/// Flattened view of the remote collection tree, rebuilt wholesale at the
/// start of every run. Insertion order (root fetch first, then children) is
/// retained so title lookups are deterministic.
#[derive(Debug, Default)]
pub struct CollectionDirectory {
    records: HashMap<String, CollectionRecord>,
    order: Vec<String>,
}

impl CollectionDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetches root and nested collections concurrently and replaces the
    /// directory contents. A failed fetch leaves the previous contents
    /// untouched.
    pub async fn refresh(&mut self, client: &RaindropClient) -> Result<(), EngineError> {
        let (root, children) =
            tokio::try_join!(client.root_collections(), client.child_collections())?;

        let mut records = HashMap::new();
        let mut order = Vec::new();
        for collection in root.into_iter().chain(children) {
            let Collection { id, title, parent } = collection;
            let record = CollectionRecord {
                title,
                parent_id: parent.map(|parent| parent.id),
            };
            if records.insert(id.clone(), record).is_none() {
                order.push(id);
            }
        }
        self.records = records;
        self.order = order;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&CollectionRecord> {
        self.records.get(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Case-insensitive, whitespace-trimmed exact title match; the first
    /// entry in insertion order wins when titles repeat.
    pub fn lookup_by_title(&self, name: &str) -> Option<&str> {
        let wanted = name.trim().to_lowercase();
        self.order
            .iter()
            .find(|id| {
                self.records
                    .get(id.as_str())
                    .is_some_and(|record| record.title.to_lowercase() == wanted)
            })
            .map(|id| id.as_str())
    }

    /// Every collection whose ancestor chain includes `root_id`, excluding
    /// `root_id` itself, in breadth-first order. Each id is visited at most
    /// once, so malformed cyclic parent chains terminate.
    pub fn descendants_of(&self, root_id: &str) -> Vec<String> {
        let mut descendants = Vec::new();
        let mut seen = HashSet::from([root_id.to_string()]);
        let mut queue = VecDeque::from([root_id.to_string()]);
        while let Some(current) = queue.pop_front() {
            for id in &self.order {
                let is_child = self
                    .records
                    .get(id.as_str())
                    .is_some_and(|record| record.parent_id.as_deref() == Some(current.as_str()));
                if is_child && seen.insert(id.clone()) {
                    descendants.push(id.clone());
                    queue.push_back(id.clone());
                }
            }
        }
        descendants
    }

    #[cfg(test)]
    pub(crate) fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (&'static str, &'static str, Option<&'static str>)>,
    {
        let mut directory = Self::new();
        for (id, title, parent_id) in entries {
            directory.records.insert(
                id.to_string(),
                CollectionRecord {
                    title: title.to_string(),
                    parent_id: parent_id.map(str::to_string),
                },
            );
            directory.order.push(id.to_string());
        }
        directory
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raindrop_core::RaindropClient;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount_collections(
        server: &MockServer,
        root: serde_json::Value,
        children: serde_json::Value,
    ) {
        Mock::given(method("GET"))
            .and(path("/rest/v1/collections"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": root })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/collections/childrens"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": children })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn refresh_merges_root_and_child_collections() {
        let server = MockServer::start().await;
        mount_collections(
            &server,
            json!([{ "_id": 1, "title": "Work" }]),
            json!([{ "_id": 2, "title": "Sub", "parent": { "$id": 1 } }]),
        )
        .await;

        let client = RaindropClient::with_base_url(&server.uri(), "test-token").unwrap();
        let mut directory = CollectionDirectory::new();
        directory.refresh(&client).await.unwrap();

        assert_eq!(directory.len(), 2);
        assert_eq!(directory.get("1").unwrap().title, "Work");
        assert_eq!(directory.get("2").unwrap().parent_id.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn failed_refresh_keeps_the_previous_contents() {
        let good = MockServer::start().await;
        mount_collections(&good, json!([{ "_id": 1, "title": "Work" }]), json!([])).await;

        let mut directory = CollectionDirectory::new();
        let client = RaindropClient::with_base_url(&good.uri(), "test-token").unwrap();
        directory.refresh(&client).await.unwrap();
        assert_eq!(directory.len(), 1);

        let bad = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/collections"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": [] })))
            .mount(&bad)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/collections/childrens"))
            .respond_with(ResponseTemplate::new(500).set_body_string("down"))
            .mount(&bad)
            .await;

        let failing = RaindropClient::with_base_url(&bad.uri(), "test-token").unwrap();
        assert!(directory.refresh(&failing).await.is_err());
        assert_eq!(directory.len(), 1);
        assert_eq!(directory.get("1").unwrap().title, "Work");
    }

    #[test]
    fn lookup_by_title_is_case_insensitive_and_trimmed() {
        let directory = CollectionDirectory::from_entries([
            ("1", "Work", None),
            ("2", "Reading List", None),
        ]);
        assert_eq!(directory.lookup_by_title("  work  "), Some("1"));
        assert_eq!(directory.lookup_by_title("READING list"), Some("2"));
        assert_eq!(directory.lookup_by_title("nope"), None);
    }

    #[test]
    fn lookup_by_title_prefers_the_first_inserted_match() {
        let directory =
            CollectionDirectory::from_entries([("1", "Dup", None), ("2", "Dup", None)]);
        assert_eq!(directory.lookup_by_title("dup"), Some("1"));
    }

    #[test]
    fn descendants_are_collected_breadth_first() {
        let directory = CollectionDirectory::from_entries([
            ("1", "Root", None),
            ("2", "A", Some("1")),
            ("3", "B", Some("1")),
            ("4", "A1", Some("2")),
            ("5", "Other", None),
        ]);
        assert_eq!(directory.descendants_of("1"), ["2", "3", "4"]);
        assert_eq!(directory.descendants_of("2"), ["4"]);
        assert!(directory.descendants_of("5").is_empty());
    }

    #[test]
    fn cyclic_parent_chains_terminate() {
        let directory =
            CollectionDirectory::from_entries([("1", "A", Some("2")), ("2", "B", Some("1"))]);
        assert_eq!(directory.descendants_of("1"), ["2"]);
    }
}
