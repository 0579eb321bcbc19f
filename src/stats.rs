//! stats.rs
//!
//! Aggregate GitHub statistics for one user, fetched lazily and cached for the
//! lifetime of the run. Every accessor hits the network at most once, so the
//! two badge renderers see the same snapshot no matter which asks first.

use anyhow::{Context, Result};
use chrono::{SecondsFormat, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::time::sleep;

use crate::config::Config;
use crate::github::{GithubClient, RestResponse};

/// Polls of `/stats/contributors` before a still-computing repo is skipped.
const CONTRIBUTOR_STATS_POLLS: usize = 10;
const CONTRIBUTOR_STATS_WAIT: Duration = Duration::from_secs(2);

/// Aggregated usage of one language across all counted repositories.
#[derive(Debug, Clone, PartialEq)]
pub struct Language {
    pub name: String,
    pub size: u64,
    pub color: Option<String>,
    /// Share of total bytes, in percent.
    pub prop: Option<f64>,
}

/// Read-only view of a user's statistics, as consumed by the badge renderers.
pub trait StatsSource {
    async fn name(&self) -> Result<String>;
    async fn stargazers(&self) -> Result<u64>;
    async fn forks(&self) -> Result<u64>;
    async fn total_contributions(&self) -> Result<u64>;
    /// Lines `(added, removed)` by the user across counted repositories.
    async fn lines_changed(&self) -> Result<(u64, u64)>;
    async fn views(&self) -> Result<u64>;
    async fn repos(&self) -> Result<BTreeSet<String>>;
    async fn languages(&self) -> Result<Vec<Language>>;
}

#[derive(Debug, Default, Clone)]
struct Overview {
    name: String,
    stargazers: u64,
    forks: u64,
    repos: BTreeSet<String>,
    languages: Vec<Language>,
}

pub struct Stats {
    client: GithubClient,
    user: String,
    excluded_repos: HashSet<String>,
    excluded_langs: HashSet<String>,
    ignore_forked_repos: bool,

    overview: OnceCell<Overview>,
    contributions: OnceCell<u64>,
    lines: OnceCell<(u64, u64)>,
    views: OnceCell<u64>,
}

impl Stats {
    pub fn new(config: &Config, http: Client) -> Self {
        Self {
            client: GithubClient::new(config.access_token.clone(), http),
            user: config.user.clone(),
            excluded_repos: config.excluded_repos.clone(),
            excluded_langs: config
                .excluded_langs
                .iter()
                .map(|l| l.to_lowercase())
                .collect(),
            ignore_forked_repos: config.ignore_forked_repos,
            overview: OnceCell::new(),
            contributions: OnceCell::new(),
            lines: OnceCell::new(),
            views: OnceCell::new(),
        }
    }

    async fn overview(&self) -> Result<&Overview> {
        self.overview.get_or_try_init(|| self.crawl_repos()).await
    }

    /// Page through owned and contributed-to repositories and fold them together.
    async fn crawl_repos(&self) -> Result<Overview> {
        let mut agg = Aggregate::default();
        let mut display_name = None;
        let mut owned_cursor: Option<String> = None;
        let mut contrib_cursor: Option<String> = None;

        loop {
            let vars = json!({
                "login": self.user,
                "ownedCursor": owned_cursor,
                "contribCursor": contrib_cursor,
            });
            let json = self.client.graphql(REPOS_QUERY, vars).await?;
            let parsed: ReposResponse = serde_json::from_value(json)
                .context("Failed to deserialize repository overview response")?;
            let user = parsed
                .data
                .and_then(|d| d.user)
                .ok_or_else(|| anyhow::anyhow!("GitHub user {} not found", self.user))?;

            if display_name.is_none() {
                display_name = Some(user.name.clone().unwrap_or_else(|| user.login.clone()));
            }

            let owned = user.repositories;
            let contrib = user.repositories_contributed_to;
            self.fold_page(
                &mut agg,
                owned.nodes.unwrap_or_default(),
                contrib.nodes.unwrap_or_default(),
            );

            let next = self.next_cursors(
                owned.page_info,
                contrib.page_info,
                owned_cursor,
                contrib_cursor,
            );
            match next {
                Some((o, c)) => (owned_cursor, contrib_cursor) = (o, c),
                None => break,
            }
        }

        let overview = agg.finish(display_name.unwrap_or_else(|| self.user.clone()));
        tracing::info!(
            repos = overview.repos.len(),
            languages = overview.languages.len(),
            "fetched repository overview"
        );
        Ok(overview)
    }

    /// Fold one page of both connections; contributed-to repos only count with forks allowed.
    fn fold_page(&self, agg: &mut Aggregate, owned: Vec<RepoNode>, contrib: Vec<RepoNode>) {
        for repo in owned {
            self.fold_repo(agg, repo);
        }
        if !self.ignore_forked_repos {
            for repo in contrib {
                self.fold_repo(agg, repo);
            }
        }
    }

    /// Cursors for the next page, or `None` once every counted connection is exhausted.
    ///
    /// An exhausted connection keeps its last cursor and yields no new nodes.
    fn next_cursors(
        &self,
        owned: PageInfo,
        contrib: PageInfo,
        owned_cursor: Option<String>,
        contrib_cursor: Option<String>,
    ) -> Option<(Option<String>, Option<String>)> {
        let owned_more = owned.has_next_page;
        let contrib_more = contrib.has_next_page && !self.ignore_forked_repos;
        if !owned_more && !contrib_more {
            return None;
        }
        Some((
            owned.end_cursor.or(owned_cursor),
            contrib.end_cursor.or(contrib_cursor),
        ))
    }

    fn fold_repo(&self, agg: &mut Aggregate, repo: RepoNode) {
        if self.ignore_forked_repos && repo.is_fork {
            return;
        }
        let bare = repo
            .name_with_owner
            .rsplit('/')
            .next()
            .unwrap_or(&repo.name_with_owner);
        if self.excluded_repos.contains(&repo.name_with_owner) || self.excluded_repos.contains(bare)
        {
            tracing::debug!(repo = %repo.name_with_owner, "skipping excluded repository");
            return;
        }
        agg.add(repo, &self.excluded_langs);
    }

    async fn fetch_total_contributions(&self) -> Result<u64> {
        let json = self
            .client
            .graphql(CONTRIBUTION_YEARS_QUERY, json!({ "login": self.user }))
            .await?;
        let years: Vec<i32> = json
            .pointer("/data/user/contributionsCollection/contributionYears")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .context("Failed to deserialize contribution years")?
            .unwrap_or_default();
        if years.is_empty() {
            return Ok(0);
        }

        let query = contributions_by_year_query(&years)?;
        let json = self
            .client
            .graphql(&query, json!({ "login": self.user }))
            .await?;
        Ok(sum_yearly_contributions(&json))
    }

    async fn fetch_lines_changed(&self) -> Result<(u64, u64)> {
        let repos = &self.overview().await?.repos;
        let (mut added, mut removed) = (0u64, 0u64);

        for repo in repos {
            let Some(contributors) = self.contributor_stats(repo).await? else {
                continue;
            };
            let (a, d) = own_lines(&contributors, &self.user);
            added = added.saturating_add(a);
            removed = removed.saturating_add(d);
        }

        Ok((added, removed))
    }

    /// Contributor statistics for one repository, polling while GitHub computes them.
    async fn contributor_stats(&self, repo: &str) -> Result<Option<Vec<ContributorStats>>> {
        let path = format!("/repos/{repo}/stats/contributors");
        for _ in 0..CONTRIBUTOR_STATS_POLLS {
            match self.client.rest(&path).await? {
                RestResponse::Ready(Value::Null) => return Ok(Some(Vec::new())),
                RestResponse::Ready(json) => {
                    let stats = serde_json::from_value(json)
                        .with_context(|| format!("Failed to deserialize {path}"))?;
                    return Ok(Some(stats));
                }
                RestResponse::Pending => sleep(CONTRIBUTOR_STATS_WAIT).await,
                RestResponse::Unavailable(status) => {
                    tracing::debug!(repo, %status, "contributor stats unavailable");
                    return Ok(None);
                }
            }
        }
        tracing::warn!(repo, "contributor stats still being computed, skipping");
        Ok(None)
    }

    async fn fetch_views(&self) -> Result<u64> {
        let repos = &self.overview().await?.repos;
        let mut total = 0u64;

        for repo in repos {
            let path = format!("/repos/{repo}/traffic/views");
            match self.client.rest(&path).await? {
                RestResponse::Ready(json) => {
                    let traffic: Traffic = serde_json::from_value(json)
                        .with_context(|| format!("Failed to deserialize {path}"))?;
                    total = total.saturating_add(traffic.views.iter().map(|v| v.count).sum());
                }
                RestResponse::Pending | RestResponse::Unavailable(_) => {
                    tracing::debug!(repo = %repo, "traffic data unavailable");
                }
            }
        }

        Ok(total)
    }
}

impl StatsSource for Stats {
    async fn name(&self) -> Result<String> {
        Ok(self.overview().await?.name.clone())
    }

    async fn stargazers(&self) -> Result<u64> {
        Ok(self.overview().await?.stargazers)
    }

    async fn forks(&self) -> Result<u64> {
        Ok(self.overview().await?.forks)
    }

    async fn total_contributions(&self) -> Result<u64> {
        self.contributions
            .get_or_try_init(|| self.fetch_total_contributions())
            .await
            .copied()
    }

    async fn lines_changed(&self) -> Result<(u64, u64)> {
        self.lines
            .get_or_try_init(|| self.fetch_lines_changed())
            .await
            .copied()
    }

    async fn views(&self) -> Result<u64> {
        self.views
            .get_or_try_init(|| self.fetch_views())
            .await
            .copied()
    }

    async fn repos(&self) -> Result<BTreeSet<String>> {
        Ok(self.overview().await?.repos.clone())
    }

    async fn languages(&self) -> Result<Vec<Language>> {
        Ok(self.overview().await?.languages.clone())
    }
}

/// Running totals while folding repositories in.
#[derive(Debug, Default)]
struct Aggregate {
    stargazers: u64,
    forks: u64,
    repos: BTreeSet<String>,
    languages: Vec<Language>,
    index: HashMap<String, usize>,
}

impl Aggregate {
    /// Count a repository once; `excluded_langs` must be lowercase.
    fn add(&mut self, repo: RepoNode, excluded_langs: &HashSet<String>) {
        if !self.repos.insert(repo.name_with_owner) {
            return;
        }
        self.stargazers = self.stargazers.saturating_add(repo.stargazers.total_count);
        self.forks = self.forks.saturating_add(repo.fork_count);

        let edges = repo.languages.and_then(|l| l.edges).unwrap_or_default();
        for edge in edges {
            let (name, color) = match edge.node {
                Some(n) => (n.name, n.color),
                None => ("Other".to_string(), None),
            };
            if excluded_langs.contains(&name.to_lowercase()) {
                continue;
            }
            match self.index.get(&name) {
                Some(&i) => {
                    let lang = &mut self.languages[i];
                    lang.size = lang.size.saturating_add(edge.size);
                }
                None => {
                    self.index.insert(name.clone(), self.languages.len());
                    self.languages.push(Language {
                        name,
                        size: edge.size,
                        color,
                        prop: None,
                    });
                }
            }
        }
    }

    fn finish(mut self, name: String) -> Overview {
        let total: u64 = self.languages.iter().map(|l| l.size).sum();
        for lang in &mut self.languages {
            lang.prop = Some(if total == 0 {
                0.0
            } else {
                100.0 * lang.size as f64 / total as f64
            });
        }
        Overview {
            name,
            stargazers: self.stargazers,
            forks: self.forks,
            repos: self.repos,
            languages: self.languages,
        }
    }
}

/// Lines `(added, removed)` credited to `login` in one repository's contributor stats.
fn own_lines(contributors: &[ContributorStats], login: &str) -> (u64, u64) {
    contributors
        .iter()
        .filter(|c| c.author.as_ref().is_some_and(|a| a.login == login))
        .flat_map(|c| &c.weeks)
        .fold((0u64, 0u64), |(a, d), w| {
            (a.saturating_add(w.a), d.saturating_add(w.d))
        })
}

/// One aliased `contributionsCollection` per calendar year.
fn contributions_by_year_query(years: &[i32]) -> Result<String> {
    let mut fields = String::new();
    for &year in years {
        let bound = |y: i32| {
            Utc.with_ymd_and_hms(y, 1, 1, 0, 0, 0)
                .single()
                .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
                .ok_or_else(|| anyhow::anyhow!("invalid contribution year {y}"))
        };
        let (from, to) = (bound(year)?, bound(year + 1)?);
        fields.push_str(&format!(
            "year{year}: contributionsCollection(from: \"{from}\", to: \"{to}\") {{ \
             contributionCalendar {{ totalContributions }} }}\n"
        ));
    }
    Ok(format!(
        "query($login: String!) {{ user(login: $login) {{\n{fields}}} }}"
    ))
}

fn sum_yearly_contributions(json: &Value) -> u64 {
    json.pointer("/data/user")
        .and_then(Value::as_object)
        .map(|years| {
            years
                .values()
                .filter_map(|y| y.pointer("/contributionCalendar/totalContributions"))
                .filter_map(Value::as_u64)
                .sum()
        })
        .unwrap_or(0)
}

const REPOS_QUERY: &str = r#"
query($login: String!, $ownedCursor: String, $contribCursor: String) {
    user(login: $login) {
        login
        name
        repositories(
            first: 100,
            ownerAffiliations: OWNER,
            orderBy: {field: UPDATED_AT, direction: DESC},
            after: $ownedCursor
        ) {
            pageInfo { hasNextPage endCursor }
            nodes { ...RepoFields }
        }
        repositoriesContributedTo(
            first: 100,
            includeUserRepositories: false,
            orderBy: {field: UPDATED_AT, direction: DESC},
            contributionTypes: [COMMIT, PULL_REQUEST, REPOSITORY, PULL_REQUEST_REVIEW],
            after: $contribCursor
        ) {
            pageInfo { hasNextPage endCursor }
            nodes { ...RepoFields }
        }
    }
}

fragment RepoFields on Repository {
    nameWithOwner
    isFork
    stargazers { totalCount }
    forkCount
    languages(first: 10, orderBy: {field: SIZE, direction: DESC}) {
        edges {
            size
            node { name color }
        }
    }
}
"#;

const CONTRIBUTION_YEARS_QUERY: &str = r#"
query($login: String!) {
    user(login: $login) {
        contributionsCollection { contributionYears }
    }
}
"#;

#[derive(Deserialize)]
struct ReposResponse {
    data: Option<ReposData>,
}

#[derive(Deserialize)]
struct ReposData {
    user: Option<ReposUser>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReposUser {
    login: String,
    name: Option<String>,
    repositories: RepoConnection,
    repositories_contributed_to: RepoConnection,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepoConnection {
    page_info: PageInfo,
    nodes: Option<Vec<RepoNode>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
    end_cursor: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepoNode {
    name_with_owner: String,
    #[serde(default)]
    is_fork: bool,
    stargazers: CountObj,
    #[serde(default)]
    fork_count: u64,
    languages: Option<LanguageConnection>,
}

#[derive(Deserialize)]
struct CountObj {
    #[serde(rename = "totalCount")]
    total_count: u64,
}

#[derive(Deserialize)]
struct LanguageConnection {
    edges: Option<Vec<LanguageEdge>>,
}

#[derive(Deserialize)]
struct LanguageEdge {
    #[serde(default)]
    size: u64,
    node: Option<LanguageNode>,
}

#[derive(Deserialize)]
struct LanguageNode {
    name: String,
    color: Option<String>,
}

#[derive(Deserialize)]
struct ContributorStats {
    author: Option<ContributorAuthor>,
    #[serde(default)]
    weeks: Vec<WeekStats>,
}

#[derive(Deserialize)]
struct ContributorAuthor {
    login: String,
}

#[derive(Deserialize)]
struct WeekStats {
    #[serde(default)]
    a: u64,
    #[serde(default)]
    d: u64,
}

#[derive(Deserialize)]
struct Traffic {
    #[serde(default)]
    views: Vec<TrafficCount>,
}

#[derive(Deserialize)]
struct TrafficCount {
    count: u64,
}
