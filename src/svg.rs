use anyhow::Result;
use std::path::PathBuf;

use crate::output::{LANGUAGES_FILE, Layout, OVERVIEW_FILE, write_badge};
use crate::stats::{Language, StatsSource};
use crate::template::{Template, escape_xml};

const FALLBACK_COLOR: &str = "#000000";
/// Animation stagger between consecutive language list items, in ms.
const DELAY_BETWEEN_MS: usize = 150;

/// Render the overview badge (name, stars, forks, contributions, lines, views, repos).
pub async fn render_overview<S: StatsSource>(stats: &S, layout: &Layout) -> Result<PathBuf> {
    let template = Template::load(&layout.template(OVERVIEW_FILE))?;

    let (added, removed) = stats.lines_changed().await?;
    let values = [
        ("name", escape_xml(&stats.name().await?)),
        ("stars", group_thousands(stats.stargazers().await?)),
        ("forks", group_thousands(stats.forks().await?)),
        (
            "contributions",
            group_thousands(stats.total_contributions().await?),
        ),
        ("lines_changed", group_thousands(added.saturating_add(removed))),
        ("views", group_thousands(stats.views().await?)),
        ("repos", group_thousands(stats.repos().await?.len() as u64)),
    ];

    let output = template.render(&values)?;
    Ok(write_badge(layout, OVERVIEW_FILE, &output)?)
}

/// Render the languages badge: a proportional color bar plus a staggered list.
pub async fn render_languages<S: StatsSource>(stats: &S, layout: &Layout) -> Result<PathBuf> {
    let template = Template::load(&layout.template(LANGUAGES_FILE))?;

    let mut languages = stats.languages().await?;
    sort_by_size(&mut languages);
    let (progress, lang_list) = language_fragments(&languages);

    let output = template.render(&[("progress", progress), ("lang_list", lang_list)])?;
    Ok(write_badge(layout, LANGUAGES_FILE, &output)?)
}

/// Largest first; equal sizes keep their original order.
fn sort_by_size(languages: &mut [Language]) {
    languages.sort_by(|a, b| b.size.cmp(&a.size));
}

/// Build the `progress` and `lang_list` fragments for already-sorted languages.
fn language_fragments(languages: &[Language]) -> (String, String) {
    let mut progress = String::new();
    let mut lang_list = String::new();

    for (i, lang) in languages.iter().enumerate() {
        let color = lang.color.as_deref().unwrap_or(FALLBACK_COLOR);
        let prop = lang.prop.unwrap_or(0.0);
        let delay = i * DELAY_BETWEEN_MS;

        progress.push_str(&format!(
            "<span style=\"background-color: {color};width: {prop:.3}%;\" \
             class=\"progress-item\"></span>"
        ));
        lang_list.push_str(&format!(
            r#"
<li style="animation-delay: {delay}ms;">
<svg xmlns="http://www.w3.org/2000/svg" class="octicon" style="fill:{color};"
viewBox="0 0 16 16" version="1.1" width="16" height="16"><path
fill-rule="evenodd" d="M8 4a4 4 0 100 8 4 4 0 000-8z"></path></svg>
<span class="lang">{name}</span>
<span class="percent">{prop:.2}%</span>
</li>

"#,
            name = escape_xml(&lang.name),
        ));
    }

    (progress, lang_list)
}

/// Format with `,` between groups of three digits.
pub fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
