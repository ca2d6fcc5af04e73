// webex/paginate.rs

//! Offset based pagination over `{"items": [...]}` list endpoints.

use std::marker::PhantomData;

use futures::stream::{self, Stream, StreamExt};
use log::*;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::client::ApiRequest;
use super::executor::Executor;
use super::outcome::RequestOutcome;

pub const DEFAULT_PAGE_SIZE: usize = 100;

/// One page of a list endpoint.
#[derive(Debug, Deserialize)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

/// Lazy, forward-only walk over a list endpoint.
///
/// Each request asks for `max = page_size` items at `offset` = items already
/// received. The walk ends on an empty page or on a page shorter than
/// `page_size`; the API's own "more pages" hints are not trusted.
/// A failed fetch is yielded once and ends the walk.
pub struct Paginator<'a, T> {
    executor: &'a Executor,
    endpoint: String,
    base_params: Vec<(String, String)>,
    page_size: usize,
    offset: usize,
    fetches: usize,
    exhausted: bool,
    _item: PhantomData<fn() -> T>,
}

impl<'a, T: DeserializeOwned> Paginator<'a, T> {
    pub fn new(
        executor: &'a Executor,
        endpoint: impl Into<String>,
        base_params: Vec<(String, String)>,
        page_size: usize,
    ) -> Self {
        Self {
            executor,
            endpoint: endpoint.into(),
            base_params,
            page_size: page_size.max(1),
            offset: 0,
            fetches: 0,
            exhausted: false,
            _item: PhantomData,
        }
    }

    /// Number of page requests issued so far.
    pub fn fetches(&self) -> usize {
        self.fetches
    }

    /// Whether more pages may remain.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Fetches the next non-empty page, or `None` once the walk is over.
    pub async fn next_page(&mut self) -> Option<RequestOutcome<Vec<T>>> {
        if self.exhausted {
            return None;
        }
        let request = ApiRequest::get(self.endpoint.as_str())
            .query_pairs(self.base_params.iter().cloned())
            .query("max", self.page_size)
            .query("offset", self.offset);
        self.fetches += 1;

        match self.executor.execute::<Page<T>>(&request).await {
            Ok(page) => {
                let received = page.items.len();
                self.offset += received;
                if received < self.page_size {
                    self.exhausted = true;
                }
                debug!(
                    "{}: page {} returned {} items ({} total)",
                    self.endpoint, self.fetches, received, self.offset
                );
                if received == 0 {
                    None
                } else {
                    Some(Ok(page.items))
                }
            }
            Err(failure) => {
                self.exhausted = true;
                Some(Err(failure))
            }
        }
    }

    /// Flattens the pages into a stream of items.
    pub fn into_stream(self) -> impl Stream<Item = RequestOutcome<T>> + 'a
    where
        T: 'a,
    {
        stream::unfold(self, |mut pages| async move {
            pages.next_page().await.map(|page| (page, pages))
        })
        .flat_map(|page| {
            let items: Vec<RequestOutcome<T>> = match page {
                Ok(items) => items.into_iter().map(Ok).collect(),
                Err(failure) => vec![Err(failure)],
            };
            stream::iter(items)
        })
    }

    /// Drains every page into one vector, stopping at the first failure.
    pub async fn collect_all(mut self) -> RequestOutcome<Vec<T>> {
        let mut all = Vec::new();
        while let Some(page) = self.next_page().await {
            all.extend(page?);
        }
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webex::outcome::ErrorKind;
    use crate::webex::test_support::executor_for;
    use rstest::rstest;
    use serde_json::{json, Value};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    /// Serves `count` numbered items honoring `max` and `offset`.
    struct Store {
        count: usize,
    }

    impl Respond for Store {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            let param = |name: &str| {
                request
                    .url
                    .query_pairs()
                    .find(|(k, _)| k == name)
                    .and_then(|(_, v)| v.parse::<usize>().ok())
            };
            let max = param("max").unwrap_or(100);
            let offset = param("offset").unwrap_or(0);
            let items: Vec<Value> = (offset..self.count.min(offset + max))
                .map(|i| json!({ "id": format!("item-{i}") }))
                .collect();
            ResponseTemplate::new(200).set_body_json(json!({ "items": items }))
        }
    }

    async fn store_server(count: usize) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wholesale/customers"))
            .respond_with(Store { count })
            .mount(&server)
            .await;
        server
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        id: String,
    }

    #[tokio::test]
    async fn should_fetch_250_items_in_three_pages() {
        let server = store_server(250).await;
        let executor = executor_for(&server);
        let mut pages = Paginator::<Item>::new(&executor, "wholesale/customers", vec![], 100);

        let mut sizes = Vec::new();
        while let Some(page) = pages.next_page().await {
            sizes.push(page.unwrap().len());
        }

        assert_eq!(sizes, vec![100, 100, 50]);
        assert_eq!(pages.fetches(), 3);
        assert!(pages.is_exhausted());
    }

    #[rstest]
    #[case(0, 10)]
    #[case(1, 1)]
    #[case(7, 3)]
    #[case(30, 10)]
    #[case(31, 10)]
    #[case(99, 100)]
    #[tokio::test]
    async fn should_return_every_item_once(#[case] count: usize, #[case] page_size: usize) {
        let server = store_server(count).await;
        let executor = executor_for(&server);
        let pages = Paginator::<Item>::new(&executor, "wholesale/customers", vec![], page_size);

        let items = pages.collect_all().await.unwrap();

        let expected: Vec<Item> = (0..count)
            .map(|i| Item {
                id: format!("item-{i}"),
            })
            .collect();
        assert_eq!(items, expected);
        // A short page ends the walk; an exact multiple needs one more, empty, fetch.
        let fetches = server.received_requests().await.unwrap().len();
        assert_eq!(fetches, count / page_size + 1);
    }

    #[tokio::test]
    async fn should_send_offsets_and_base_params() {
        let server = store_server(5).await;
        let executor = executor_for(&server);
        let pages = Paginator::<Item>::new(
            &executor,
            "wholesale/customers",
            vec![("orgId".to_string(), "o1".to_string())],
            2,
        );
        pages.collect_all().await.unwrap();

        let offsets: Vec<String> = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .map(|r| {
                assert!(r.url.query().unwrap().contains("orgId=o1"));
                r.url
                    .query_pairs()
                    .find(|(k, _)| k == "offset")
                    .map(|(_, v)| v.into_owned())
                    .unwrap()
            })
            .collect();
        assert_eq!(offsets, vec!["0", "2", "4"]);
    }

    #[tokio::test]
    async fn should_treat_empty_first_page_as_empty_sequence() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": [] })))
            .mount(&server)
            .await;
        let executor = executor_for(&server);
        let mut pages = Paginator::<Item>::new(&executor, "people", vec![], 100);

        assert!(pages.next_page().await.is_none());
        assert!(pages.next_page().await.is_none());
        assert_eq!(pages.fetches(), 1);
    }

    #[tokio::test]
    async fn should_stream_items_and_stop_on_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "items": [{"id": "a"}, {"id": "b"}] })),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;
        let executor = executor_for(&server);

        let results: Vec<RequestOutcome<Item>> =
            Paginator::<Item>::new(&executor, "people", vec![], 2)
                .into_stream()
                .collect()
                .await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().id, "a");
        assert_eq!(results[1].as_ref().unwrap().id, "b");
        assert_eq!(
            results[2].as_ref().unwrap_err().kind,
            ErrorKind::Authentication
        );
    }
}
