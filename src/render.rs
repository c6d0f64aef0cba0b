use crate::types::Draft;
use regex::Regex;
use std::sync::OnceLock;
use url::form_urlencoded;

fn md_link_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").expect("valid regex"))
}

fn tracked_click_url(tracking_base: &str, draft_id: &str, target: &str) -> String {
    let encoded: String = form_urlencoded::byte_serialize(target.as_bytes()).collect();
    format!("{tracking_base}/click?draft_id={draft_id}&url={encoded}")
}

/// Replace Markdown links with tracked anchors, escaping everything else.
fn render_inline(line: &str, tracking_base: &str, draft_id: &str) -> String {
    let mut out = String::new();
    let mut last = 0;
    for caps in md_link_regex().captures_iter(line) {
        let whole = caps.get(0).expect("match");
        let label = &caps[1];
        let target = &caps[2];
        out.push_str(&html_escape::encode_text(&line[last..whole.start()]));
        out.push_str(&format!(
            r#"<a href="{}">{}</a>"#,
            html_escape::encode_double_quoted_attribute(&tracked_click_url(
                tracking_base,
                draft_id,
                target
            )),
            html_escape::encode_text(label),
        ));
        last = whole.end();
    }
    out.push_str(&html_escape::encode_text(&line[last..]));
    out
}

/// Render a Markdown-ish draft to delivery HTML: `###` headings, `-` bullets,
/// paragraphs, tracked click links, and a 1x1 open pixel at the end.
pub fn render_email_html(draft: &Draft, tracking_base: &str) -> String {
    let tracking_base = tracking_base.trim_end_matches('/');
    let draft_id = draft.id.to_string();

    let mut html = String::from("<html><body>\n");
    let mut in_list = false;
    for line in draft.draft_text.lines() {
        let line = line.trim_end();
        if let Some(heading) = line.strip_prefix("### ") {
            if in_list {
                html.push_str("</ul>\n");
                in_list = false;
            }
            html.push_str(&format!(
                "<h3>{}</h3>\n",
                render_inline(heading, tracking_base, &draft_id)
            ));
        } else if let Some(bullet) = line.strip_prefix("- ") {
            if !in_list {
                html.push_str("<ul>\n");
                in_list = true;
            }
            html.push_str(&format!(
                "<li>{}</li>\n",
                render_inline(bullet, tracking_base, &draft_id)
            ));
        } else if line.is_empty() {
            if in_list {
                html.push_str("</ul>\n");
                in_list = false;
            }
        } else {
            if in_list {
                html.push_str("</ul>\n");
                in_list = false;
            }
            html.push_str(&format!(
                "<p>{}</p>\n",
                render_inline(line, tracking_base, &draft_id)
            ));
        }
    }
    if in_list {
        html.push_str("</ul>\n");
    }
    html.push_str(&format!(
        r#"<img src="{tracking_base}/open?draft_id={draft_id}" width="1" height="1" alt=""/>"#
    ));
    html.push_str("\n</body></html>");
    html
}
