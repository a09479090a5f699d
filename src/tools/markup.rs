//! 小部件 HTML 片段（拼接到任务结果的 Markdown 之后）

pub fn escape_html(unsafe_text: &str) -> String {
    let mut out = String::with_capacity(unsafe_text.len());
    for c in unsafe_text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}

/// 通用卡片：标题 + 已转义的正文 HTML + 可选外链按钮
pub fn card(kind: &str, title: &str, body_html: &str, link: Option<(&str, &str)>) -> String {
    let button = link
        .map(|(href, label)| {
            format!(
                "\n  <a href=\"{}\" target=\"_blank\" class=\"widget-link\">{}</a>",
                escape_html(href),
                escape_html(label)
            )
        })
        .unwrap_or_default();
    format!(
        "<div class=\"widget widget-{}\">\n  <h4>{}</h4>\n  {}{}\n</div>",
        kind,
        escape_html(title),
        body_html,
        button
    )
}
