//! Reddit post source
//!
//! Polls `/r/{subreddit}/new` at the subscription interval and forwards posts
//! it has not seen before. With credentials the OAuth API is used (password
//! grant, token cached until shortly before it expires); without them the
//! public `.json` listing is polled.

use super::traits::{PostSource, SubscribeOptions, Subscription, SubscriptionSender};
use crate::config::{RedditConfig, RedditCredentials};
use crate::error::{Error, StreamError};
use crate::types::Post;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use url::Url;

const OAUTH_API_URL: &str = "https://oauth.reddit.com";
const PUBLIC_API_URL: &str = "https://www.reddit.com";
const AUTH_URL: &str = "https://www.reddit.com";
const TOKEN_ENDPOINT: &str = "api/v1/access_token";

/// Posts requested per poll (Reddit's maximum page size)
const LISTING_LIMIT: &str = "100";

/// Identifiers remembered per subscription to suppress repeats across polls
const SEEN_CAPACITY: usize = 2000;

/// Channel depth for each subscription's post and error channels
const SUBSCRIPTION_BUFFER: usize = 100;

/// Refresh the token this long before Reddit says it expires
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: Instant,
}

impl AccessToken {
    fn is_fresh(&self) -> bool {
        Instant::now() + TOKEN_EXPIRY_MARGIN < self.expires_at
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Thing>,
}

#[derive(Deserialize)]
struct Thing {
    data: PostData,
}

#[derive(Deserialize)]
struct PostData {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    subreddit: String,
    author: Option<String>,
    permalink: Option<String>,
    url: Option<String>,
    created_utc: Option<f64>,
}

impl From<PostData> for Post {
    fn from(data: PostData) -> Self {
        Post {
            id: data.id,
            title: data.title,
            subreddit: data.subreddit,
            author: data.author,
            permalink: data.permalink,
            url: data.url,
            created_at: data
                .created_utc
                .and_then(|secs| DateTime::<Utc>::from_timestamp(secs as i64, 0)),
        }
    }
}

/// Bounded memory of recently seen identifiers, oldest evicted first
struct SeenSet {
    order: VecDeque<String>,
    ids: HashSet<String>,
    capacity: usize,
}

impl SeenSet {
    fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity),
            ids: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    /// Returns true if `id` was not already present
    fn insert(&mut self, id: &str) -> bool {
        if self.ids.contains(id) {
            return false;
        }
        if self.order.len() == self.capacity
            && let Some(oldest) = self.order.pop_front()
        {
            self.ids.remove(&oldest);
        }
        self.order.push_back(id.to_string());
        self.ids.insert(id.to_string());
        true
    }
}

/// Reddit API client that streams new posts per subreddit
///
/// # Examples
///
/// ```no_run
/// use rippl::config::RedditConfig;
/// use rippl::source::{PostSource, RedditClient, SubscribeOptions, SubscriptionEvent};
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let client = RedditClient::new(&RedditConfig::default())?;
/// let mut sub = client
///     .subscribe("pics", SubscribeOptions::new(Duration::from_secs(5)))
///     .await?;
///
/// while let Some(SubscriptionEvent::Post(post)) = sub.next().await {
///     println!("{} {}", post.id, post.title);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RedditClient {
    http: reqwest::Client,
    api_url: Url,
    auth_url: Url,
    credentials: Option<RedditCredentials>,
    token: Arc<Mutex<Option<AccessToken>>>,
}

impl RedditClient {
    /// Create a client from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if an override URL is invalid or the HTTP client
    /// cannot be created.
    pub fn new(config: &RedditConfig) -> crate::Result<Self> {
        let default_api = if config.credentials.is_some() {
            OAUTH_API_URL
        } else {
            PUBLIC_API_URL
        };
        let api_url = parse_base_url(config.api_url.as_deref().unwrap_or(default_api), "reddit.api_url")?;
        let auth_url = parse_base_url(config.auth_url.as_deref().unwrap_or(AUTH_URL), "reddit.auth_url")?;

        // Reddit answers a listing for a subreddit that does not exist with a
        // redirect to search; surface that instead of following it.
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_url,
            auth_url,
            credentials: config.credentials.clone(),
            token: Arc::new(Mutex::new(None)),
        })
    }

    /// Whether requests are authenticated
    pub fn is_authenticated(&self) -> bool {
        self.credentials.is_some()
    }

    /// Current bearer token, fetching a new one if needed
    async fn access_token(&self) -> Result<Option<String>, StreamError> {
        let Some(credentials) = &self.credentials else {
            return Ok(None);
        };

        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh()) {
            return Ok(Some(token.value.clone()));
        }

        let token = self.fetch_token(credentials).await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(Some(value))
    }

    async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }

    async fn fetch_token(&self, credentials: &RedditCredentials) -> Result<AccessToken, StreamError> {
        let url = self
            .auth_url
            .join(TOKEN_ENDPOINT)
            .map_err(|e| StreamError::Auth(format!("invalid token URL: {e}")))?;

        tracing::debug!(url = %url, "Requesting Reddit access token");

        let response = self
            .http
            .post(url)
            .basic_auth(&credentials.client_id, Some(&credentials.client_secret))
            .form(&[
                ("grant_type", "password"),
                ("username", credentials.username.as_str()),
                ("password", credentials.password.as_str()),
            ])
            .send()
            .await?;

        // Only a rejected grant is an auth failure; outages and rate limits
        // on the token endpoint are transient like any other status.
        let status = response.status();
        match status.as_u16() {
            400 | 401 | 403 => {
                return Err(StreamError::Auth(format!(
                    "token endpoint returned HTTP {}",
                    status.as_u16()
                )));
            }
            code if !status.is_success() => {
                return Err(StreamError::Status {
                    source_name: TOKEN_ENDPOINT.to_string(),
                    status: code,
                });
            }
            _ => {}
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| StreamError::Decode(format!("token response: {e}")))?;

        match (body.access_token, body.error) {
            (Some(value), None) => Ok(AccessToken {
                value,
                expires_at: Instant::now() + Duration::from_secs(body.expires_in.unwrap_or(3600)),
            }),
            (_, Some(error)) => Err(StreamError::Auth(error)),
            (None, None) => Err(StreamError::Auth("token response had no access_token".into())),
        }
    }

    fn listing_url(&self, subreddit: &str) -> Result<Url, StreamError> {
        let leaf = if self.is_authenticated() { "new" } else { "new.json" };
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|()| StreamError::Decode(format!("{} cannot be a base URL", self.api_url)))?
            .pop_if_empty()
            .extend(["r", subreddit, leaf]);
        url.query_pairs_mut()
            .append_pair("limit", LISTING_LIMIT)
            .append_pair("raw_json", "1");
        Ok(url)
    }

    /// Fetch the newest posts of `subreddit`, newest first
    ///
    /// # Errors
    ///
    /// Returns a [`StreamError`]; check [`StreamError::is_terminal`] to decide
    /// whether polling should continue.
    pub async fn fetch_new(&self, subreddit: &str) -> Result<Vec<Post>, StreamError> {
        let url = self.listing_url(subreddit)?;

        let mut response = self.get_listing(&url).await?;
        if response.status() == reqwest::StatusCode::UNAUTHORIZED && self.is_authenticated() {
            tracing::debug!(source = %subreddit, "Listing rejected token, refreshing");
            self.invalidate_token().await;
            response = self.get_listing(&url).await?;
        }

        let status = response.status();
        if status.is_redirection() {
            let location = response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            return Err(StreamError::Redirected {
                source_name: subreddit.to_string(),
                location,
            });
        }
        if !status.is_success() {
            return Err(StreamError::Status {
                source_name: subreddit.to_string(),
                status: status.as_u16(),
            });
        }

        let listing: Listing = response
            .json()
            .await
            .map_err(|e| StreamError::Decode(format!("r/{subreddit} listing: {e}")))?;

        Ok(listing
            .data
            .children
            .into_iter()
            .map(|thing| Post::from(thing.data))
            .collect())
    }

    async fn get_listing(&self, url: &Url) -> Result<reqwest::Response, StreamError> {
        let mut request = self.http.get(url.clone());
        if let Some(token) = self.access_token().await? {
            request = request.bearer_auth(token);
        }
        Ok(request.send().await?)
    }

    /// Poll `subreddit` until the subscription is stopped
    async fn poll(self, subreddit: String, options: SubscribeOptions, tx: SubscriptionSender) {
        let mut seen = SeenSet::new(SEEN_CAPACITY);
        let mut backlog_pending = options.discard_initial;
        let mut ticker = tokio::time::interval(options.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tx.stopped() => break,
                _ = ticker.tick() => {}
            }

            let result = tokio::select! {
                _ = tx.stopped() => break,
                result = self.fetch_new(&subreddit) => result,
            };

            match result {
                Ok(posts) => {
                    let discard = std::mem::take(&mut backlog_pending);
                    let mut forwarded = 0usize;
                    // Listings are newest first; deliver in arrival order.
                    for post in posts.into_iter().rev() {
                        if !seen.insert(&post.id) || discard {
                            continue;
                        }
                        if !tx.send_post(post).await {
                            return;
                        }
                        forwarded += 1;
                    }
                    if discard {
                        tracing::debug!(source = %subreddit, "Discarded initial backlog");
                    } else if forwarded > 0 {
                        tracing::debug!(source = %subreddit, count = forwarded, "Forwarded new posts");
                    }
                }
                Err(e) => {
                    if !tx.send_error(e).await {
                        return;
                    }
                }
            }
        }

        tracing::debug!(source = %subreddit, "Reddit poller stopped");
    }
}

fn parse_base_url(raw: &str, key: &str) -> crate::Result<Url> {
    let url = Url::parse(raw).map_err(|e| Error::config(format!("invalid URL '{raw}': {e}"), key))?;
    if url.cannot_be_a_base() {
        return Err(Error::config(format!("'{raw}' cannot be a base URL"), key));
    }
    Ok(url)
}

#[async_trait]
impl PostSource for RedditClient {
    async fn subscribe(
        &self,
        source: &str,
        options: SubscribeOptions,
    ) -> crate::Result<Subscription> {
        let subreddit = source.trim();
        if subreddit.is_empty() {
            return Err(Error::config("subreddit name is empty", "sources"));
        }

        // Fail fast on bad credentials; a token outage is left to the poller.
        match self.access_token().await {
            Err(e) if e.is_terminal() => return Err(e.into()),
            Err(e) => {
                tracing::warn!(source = %subreddit, error = %e, "Token request failed, poller will retry");
            }
            Ok(_) => {}
        }

        let (tx, subscription) = Subscription::channel(SUBSCRIPTION_BUFFER);
        tokio::spawn(self.clone().poll(subreddit.to_string(), options, tx));
        Ok(subscription)
    }

    fn name(&self) -> &'static str {
        "reddit"
    }
}
