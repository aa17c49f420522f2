use crate::models::{DashboardView, KpiCard, LeaderboardRow};

pub fn render_index(view: &DashboardView, logo: Option<&str>) -> String {
    let logo = logo
        .map(|src| format!(r#"<div class="logo-wrap"><img class="logo" src="{}" width="160" alt="" /></div>"#, escape(src)))
        .unwrap_or_default();
    let error = view
        .error
        .as_ref()
        .map(|panel| {
            format!(
                r#"<div class="alert">{}</div><div class="alert hint">{}</div>"#,
                escape(&panel.message),
                escape(&panel.hint)
            )
        })
        .unwrap_or_default();
    let primary: String = view.primary.iter().map(render_card).collect();
    let secondary: String = view.secondary.iter().map(render_card).collect();
    let rows: String = view.leaderboard.iter().map(render_row).collect();

    fill(
        INDEX_HTML,
        &[
            ("TITLE", escape(&view.title)),
            ("LOGO", logo),
            ("SUBTITLE", escape(&view.subtitle)),
            ("ERROR", error),
            ("PRIMARY", primary),
            ("SECONDARY", secondary),
            ("ROWS", rows),
            ("REFRESH_EVERY", refresh_phrase(view.refresh_interval_secs)),
            ("REFRESH_MS", (view.refresh_interval_secs * 1000).to_string()),
        ],
    )
}

pub fn render_login(title: &str, error: Option<&str>) -> String {
    let error = error
        .map(|message| format!(r#"<p class="alert">{}</p>"#, escape(message)))
        .unwrap_or_default();
    fill(LOGIN_HTML, &[("TITLE", escape(title)), ("ERROR", error)])
}

/// Substitutes `{{KEY}}` placeholders in one pass over the template, so
/// inserted text is never scanned for placeholders itself.
fn fill(template: &str, values: &[(&str, String)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };
        let key = &after[..end];
        match values.iter().find(|(name, _)| *name == key) {
            Some((_, value)) => out.push_str(value),
            None => out.push_str(&rest[start..start + 2 + end + 2]),
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    out
}

fn refresh_phrase(secs: u64) -> String {
    match (secs / 60, secs % 60) {
        (1, 0) => "every minute".to_string(),
        (minutes, 0) => format!("every {minutes} minutes"),
        _ if secs == 1 => "every second".to_string(),
        _ => format!("every {secs} seconds"),
    }
}

fn render_card(card: &KpiCard) -> String {
    let delta = card
        .delta
        .as_ref()
        .map(|delta| {
            format!(
                r#"<div class="metric-delta {}">{} {}</div>"#,
                delta.direction.css_class(),
                escape(&delta.arrow),
                escape(&delta.text)
            )
        })
        .unwrap_or_default();
    format!(
        r#"<div class="metric-card"><div class="metric-label">{}</div><div class="metric-value">{}</div>{}</div>"#,
        escape(&card.label),
        escape(&card.value),
        delta
    )
}

fn render_row(row: &LeaderboardRow) -> String {
    format!(
        r#"<tr><td class="rank">{}</td><td>{}</td><td>{}</td><td>{}</td></tr>"#,
        row.rank,
        escape(&row.artist),
        escape(&row.streams),
        escape(&row.short_video_views)
    )
}

/// Escapes text for use in element content and quoted attributes.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

const LOGIN_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  <title>{{TITLE}} - Dashboard</title>
  <style>
    :root {
      --bg: #000000;
      --ink: #ffffff;
      --muted: #aaaaaa;
      --panel: #1a1a1a;
      --danger: #ff4d4d;
    }

    body {
      margin: 0;
      min-height: 100vh;
      background: var(--bg);
      color: var(--ink);
      font-family: "Special Gothic", "Helvetica Neue", sans-serif;
      display: grid;
      place-items: center;
    }

    form {
      display: grid;
      gap: 14px;
      width: min(360px, 90vw);
    }

    input, button {
      font: inherit;
      padding: 12px 14px;
      border-radius: 8px;
      border: 1px solid #333333;
      background: var(--panel);
      color: var(--ink);
    }

    button {
      cursor: pointer;
      font-weight: 700;
    }

    .alert {
      margin: 0;
      padding: 10px 14px;
      border-radius: 8px;
      background: var(--panel);
      color: var(--danger);
    }
  </style>
</head>
<body>
  <main>
    <h2>{{TITLE}} Dashboard</h2>
    <form method="post" action="/login">
      <label for="password">Enter Password</label>
      <input id="password" name="password" type="password" autocomplete="current-password" autofocus />
      <button type="submit">Enter</button>
      {{ERROR}}
    </form>
  </main>
</body>
</html>
"#;

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  <title>{{TITLE}} - Dashboard</title>
  <style>
    @import url('https://fonts.cdnfonts.com/css/special-gothic');

    :root {
      --bg: #000000;
      --ink: #ffffff;
      --panel: #1a1a1a;
      --rule: #333333;
      --up: #19c37d;
      --down: #ff4d4d;
      --flat: #aaaaaa;
    }

    * {
      box-sizing: border-box;
    }

    body {
      margin: 0;
      background: var(--bg);
      color: var(--ink);
      font-family: "Special Gothic", "Helvetica Neue", sans-serif;
    }

    .app {
      width: 100%;
      padding: 8px 24px 24px;
      display: grid;
      gap: 18px;
    }

    .logo-wrap {
      display: flex;
      justify-content: center;
    }

    h1 {
      font-size: 2.8rem;
      text-align: center;
      margin: 0;
    }

    h2 {
      margin: 0;
    }

    .subtitle, .footer {
      font-size: 0.85rem;
      text-align: center;
      margin: 0;
    }

    hr {
      width: 100%;
      border: none;
      border-top: 1px solid var(--rule);
      margin: 0;
    }

    .cards {
      display: grid;
      grid-template-columns: repeat(4, 1fr);
      gap: 8px;
    }

    .cards.secondary {
      grid-template-columns: repeat(2, minmax(0, 280px));
      justify-content: center;
    }

    .metric-card {
      text-align: center;
      padding: 4px 0;
    }

    .metric-label {
      font-size: 1.35rem;
      font-weight: 800;
      opacity: 0.95;
    }

    .metric-value {
      font-size: 3.2rem;
      font-weight: 900;
      white-space: nowrap;
    }

    .metric-delta {
      font-size: 1.5rem;
      font-weight: 900;
      white-space: nowrap;
    }

    .delta-up { color: var(--up); }
    .delta-down { color: var(--down); }
    .delta-flat { color: var(--flat); }

    .alert {
      background: var(--panel);
      padding: 12px 16px;
      border-radius: 8px;
      color: var(--down);
    }

    .alert.hint {
      color: var(--ink);
    }

    table {
      width: 100%;
      border-collapse: collapse;
      font-size: 1.1rem;
    }

    th {
      text-align: left;
      padding: 10px 15px;
      border-bottom: 2px solid var(--ink);
      font-size: 1.2rem;
    }

    td {
      padding: 8px 15px;
      border-bottom: 1px solid var(--rule);
    }

    .rank {
      width: 50px;
      text-align: center;
    }
  </style>
</head>
<body>
  <main class="app">
    {{LOGO}}
    <h1 id="title">{{TITLE}}</h1>
    <p class="subtitle" id="subtitle">{{SUBTITLE}}</p>
    <section id="error">{{ERROR}}</section>
    <hr />
    <section class="cards" id="primary">{{PRIMARY}}</section>
    <hr />
    <section class="cards secondary" id="secondary">{{SECONDARY}}</section>
    <hr />
    <h2>Top Artists (Last 7 Days)</h2>
    <table>
      <thead>
        <tr>
          <th class="rank">#</th>
          <th>Artist</th>
          <th>Streams</th>
          <th>TikTok Views</th>
        </tr>
      </thead>
      <tbody id="leaderboard">{{ROWS}}</tbody>
    </table>
    <p class="footer">Dashboard auto-refreshes {{REFRESH_EVERY}}</p>
  </main>
  <script>
    const REFRESH_MS = {{REFRESH_MS}};
    const subtitleEl = document.getElementById('subtitle');
    const errorEl = document.getElementById('error');
    const primaryEl = document.getElementById('primary');
    const secondaryEl = document.getElementById('secondary');
    const leaderboardEl = document.getElementById('leaderboard');

    const el = (tag, className, text) => {
      const node = document.createElement(tag);
      if (className) {
        node.className = className;
      }
      if (text !== undefined) {
        node.textContent = text;
      }
      return node;
    };

    const renderCard = (card) => {
      const node = el('div', 'metric-card');
      node.append(el('div', 'metric-label', card.label), el('div', 'metric-value', card.value));
      if (card.delta) {
        node.append(el('div', `metric-delta delta-${card.delta.direction}`, `${card.delta.arrow} ${card.delta.text}`));
      }
      return node;
    };

    const renderRow = (row) => {
      const tr = el('tr');
      tr.append(
        el('td', 'rank', String(row.rank)),
        el('td', '', row.artist),
        el('td', '', row.streams),
        el('td', '', row.short_video_views)
      );
      return tr;
    };

    const render = (view) => {
      subtitleEl.textContent = view.subtitle;
      errorEl.replaceChildren(
        ...(view.error ? [el('div', 'alert', view.error.message), el('div', 'alert hint', view.error.hint)] : [])
      );
      if (view.status === 'loading' || view.status === 'error') {
        return;
      }
      primaryEl.replaceChildren(...view.primary.map(renderCard));
      secondaryEl.replaceChildren(...view.secondary.map(renderCard));
      leaderboardEl.replaceChildren(...view.leaderboard.map(renderRow));
    };

    const refresh = async () => {
      try {
        const res = await fetch('/api/dashboard', { credentials: 'same-origin' });
        if (res.status === 401) {
          window.location.reload();
          return;
        }
        if (res.ok) {
          render(await res.json());
        }
      } catch (err) {
        console.warn('refresh failed', err);
      } finally {
        setTimeout(refresh, REFRESH_MS);
      }
    };

    setTimeout(refresh, REFRESH_MS);
  </script>
</body>
</html>
"#;
