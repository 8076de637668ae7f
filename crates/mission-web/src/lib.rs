use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use axum::Router;
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use mission_common::MissionConfig;
use mission_relay::CliRelay;
use mission_store::{DocumentLibrary, FileStore};
use tracing::info;

mod api;
mod error;

pub use error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub store: FileStore,
    pub documents: DocumentLibrary,
    pub relay: CliRelay,
    pub external_config: PathBuf,
    pub workspace: PathBuf,
}

impl AppState {
    pub fn from_config(config: &MissionConfig) -> Result<Self> {
        let store = FileStore::open(&config.workspace_dir)?
            .with_demo_seed(config.seed_demo_data)
            .with_history_limit(config.console.history_limit);
        let relay = CliRelay::from_config(&config.relay).context("invalid relay configuration")?;
        Ok(Self {
            store,
            documents: DocumentLibrary::new(&config.workspace_dir, &config.memory_dir()),
            relay,
            external_config: config.external_config.clone(),
            workspace: config.workspace_dir.clone(),
        })
    }
}

/// Runs a blocking store or relay call off the async executor.
pub(crate) async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| ApiError::internal("Internal error", err))?
}

pub fn router(state: AppState) -> Router {
    let not_allowed = api::method_not_allowed;
    Router::new()
        .route("/", get(index).fallback(not_allowed))
        .route("/api/health", get(api::health).fallback(not_allowed))
        .route(
            "/api/tasks",
            get(api::list_tasks).post(api::post_tasks).fallback(not_allowed),
        )
        .route(
            "/api/cron",
            get(api::list_cron).post(api::post_cron).fallback(not_allowed),
        )
        .route("/api/sessions", get(api::list_sessions).fallback(not_allowed))
        .route("/api/files", get(api::list_files).fallback(not_allowed))
        .route(
            "/api/files/content",
            get(api::read_file).post(api::write_file).fallback(not_allowed),
        )
        .route(
            "/api/approvals",
            get(api::list_approvals)
                .post(api::post_approvals)
                .fallback(not_allowed),
        )
        .route(
            "/api/console",
            get(api::console_history)
                .post(api::post_console)
                .fallback(not_allowed),
        )
        .route(
            "/api/settings",
            get(api::read_settings)
                .post(api::save_settings)
                .fallback(not_allowed),
        )
        .route("/api/status", get(api::status).fallback(not_allowed))
        .route("/api/spawn", post(api::spawn).fallback(not_allowed))
        .fallback(api::not_found)
        .with_state(state)
}

pub async fn serve(bind_addr: &str, state: AppState) -> Result<()> {
    let addr: SocketAddr = bind_addr
        .parse()
        .with_context(|| format!("invalid bind address: {bind_addr}"))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "mission control listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

pub fn default_bind_addr() -> &'static str {
    "127.0.0.1:3000"
}

async fn index() -> impl IntoResponse {
    Html(
        r##"<!doctype html>
<html>
<head>
  <meta charset="utf-8" />
  <title>Mission Control</title>
  <style>
    body { font-family: ui-monospace, SFMono-Regular, Menlo, monospace; margin: 24px; background: #0f172a; color: #e2e8f0; }
    nav button { background: #1e293b; color: #e2e8f0; border: 1px solid #334155; border-radius: 6px; padding: 6px 12px; margin-right: 6px; }
    nav button.active { background: #2563eb; }
    .panel { display: none; margin-top: 16px; }
    .panel.active { display: block; }
    .columns { display: grid; grid-template-columns: repeat(4, 1fr); gap: 12px; }
    .card { background: #1e293b; border: 1px solid #334155; border-radius: 8px; padding: 10px; margin-bottom: 8px; }
    .muted { color: #94a3b8; }
    pre { white-space: pre-wrap; }
  </style>
</head>
<body>
  <h1>Mission Control</h1>
  <nav id="tabs"></nav>
  <section class="panel" id="dashboard"><pre id="dashboard_body" class="muted">Loading...</pre></section>
  <section class="panel" id="console">
    <div id="console_log"></div>
    <input id="console_text" size="60" placeholder="Message the agent" />
    <button onclick="sendConsole()">Send</button>
    <button onclick="clearConsole()">Clear</button>
  </section>
  <section class="panel" id="kanban">
    <input id="task_title" size="40" placeholder="New task" />
    <button onclick="createTask()">Add</button>
    <div class="columns" id="kanban_columns"></div>
  </section>
  <section class="panel" id="memory"><div id="memory_files"></div><pre id="memory_content"></pre></section>
  <section class="panel" id="fleet"><div id="fleet_sessions"></div><div id="fleet_cron"></div></section>
  <section class="panel" id="approvals"><div id="approval_list"></div></section>
  <section class="panel" id="settings"><pre id="settings_body"></pre></section>
  <script>
    const TABS = { dashboard: 10000, console: 30000, kanban: 30000, memory: 30000, fleet: 15000, approvals: 10000, settings: 30000 };
    const STATUSES = ['backlog', 'in-progress', 'review', 'done'];
    let active = 'dashboard';
    let timer = null;
    let ticket = 0;

    async function api(path, body) {
      const init = body === undefined ? {} : { method: 'POST', headers: {'content-type': 'application/json'}, body: JSON.stringify(body) };
      const res = await fetch(path, init);
      const data = await res.json();
      if (!res.ok) throw new Error(data.error || res.statusText);
      return data;
    }
    function esc(s) { return String(s ?? '').replace(/[&<>"']/g, c => '&#' + c.charCodeAt(0) + ';'); }

    const loaders = {
      async dashboard() {
        const [tasks, approvals, sessions, status] = await Promise.all([
          api('/api/tasks'), api('/api/approvals?status=pending'), api('/api/sessions'), api('/api/status')]);
        const counts = STATUSES.map(s => `${s}: ${tasks.filter(t => t.status === s).length}`).join('\n');
        const tokens = sessions.reduce((n, s) => n + (s.tokensUsed || 0), 0);
        return `${counts}\npending approvals: ${approvals.length}\nsessions: ${sessions.length} (${tokens} tokens)\n\n${JSON.stringify(status, null, 2)}`;
      },
      async console() {
        const rows = await api('/api/console');
        return rows.length ? rows.map(m => `<div class="card"><span class="muted">${esc(m.timestamp)} ${esc(m.agentName || m.sender)}</span><br/>${esc(m.text)}</div>`).join('') : '<p class="muted">No messages</p>';
      },
      async kanban() {
        const tasks = await api('/api/tasks');
        return STATUSES.map(s => `<div><h3>${s}</h3>${tasks.filter(t => t.status === s).map(t => `
          <div class="card">${esc(t.title)} <span class="muted">[${esc(t.priority)}]</span><br/>
          ${STATUSES.filter(n => n !== s).map(n => `<button onclick="moveTask('${esc(t.id)}','${n}')">${n}</button>`).join('')}</div>`).join('')}</div>`).join('');
      },
      async memory() {
        const files = await api('/api/files');
        return files.length ? files.map(f => `<div class="card"><a href="#" onclick="openFile('${esc(f.path)}');return false;">${esc(f.path)}</a><br/><span class="muted">${esc(f.preview)}</span></div>`).join('') : '<p class="muted">No documents</p>';
      },
      async fleet() {
        const [sessions, jobs] = await Promise.all([api('/api/sessions'), api('/api/cron')]);
        const s = sessions.map(x => `<div class="card">${esc(x.displayName || x.key)} <span class="muted">${esc(x.model)} ${x.tokensUsed} tokens</span></div>`).join('');
        const j = jobs.map(x => `<div class="card">${esc(x.name)} <span class="muted">${x.enabled ? 'enabled' : 'disabled'}</span> <button onclick="runJob('${esc(x.id)}')">Run</button></div>`).join('');
        return (s || '<p class="muted">No sessions</p>') + '<h3>Cron</h3>' + (j || '<p class="muted">No jobs</p>');
      },
      async approvals() {
        const rows = await api('/api/approvals?status=pending');
        return rows.length ? rows.map(a => `<div class="card"><b>${esc(a.type)}</b> by ${esc(a.requestedBy)}<pre>${esc(a.content)}</pre>
          <button onclick="resolve('${esc(a.id)}','approved')">Approve</button>
          <button onclick="resolve('${esc(a.id)}','rejected')">Reject</button></div>`).join('') : '<p class="muted">No pending approvals</p>';
      },
      async settings() { return JSON.stringify(await api('/api/settings'), null, 2); },
    };
    const targets = { dashboard: 'dashboard_body', console: 'console_log', kanban: 'kanban_columns', memory: 'memory_files', fleet: 'fleet_sessions', approvals: 'approval_list', settings: 'settings_body' };

    async function load(tab) {
      const mine = ++ticket;
      const el = document.getElementById(targets[tab]);
      try {
        const html = await loaders[tab]();
        if (mine !== ticket || tab !== active) return;
        if (el.tagName === 'PRE') el.textContent = html; else el.innerHTML = html;
      } catch (err) {
        if (mine !== ticket) return;
        el.textContent = 'Error: ' + err.message;
      }
    }
    function show(tab) {
      active = tab;
      document.querySelectorAll('.panel').forEach(p => p.classList.toggle('active', p.id === tab));
      document.querySelectorAll('nav button').forEach(b => b.classList.toggle('active', b.dataset.tab === tab));
      clearInterval(timer);
      load(tab);
      timer = setInterval(() => load(tab), TABS[tab]);
    }
    async function act(fn) { try { await fn(); } catch (err) { alert(err.message); } load(active); }
    function createTask() { act(() => api('/api/tasks', {action: 'create', title: document.getElementById('task_title').value})); }
    function moveTask(id, status) { act(() => api('/api/tasks', {action: 'update', id, status})); }
    function resolve(id, status) { act(() => api('/api/approvals', {action: 'update', id, status})); }
    function runJob(jobId) { act(() => api('/api/cron', {action: 'run', jobId})); }
    function sendConsole() { act(() => api('/api/console', {action: 'append', sender: 'user', text: document.getElementById('console_text').value})); }
    function clearConsole() { act(() => api('/api/console', {action: 'clear'})); }
    async function openFile(path) {
      try { document.getElementById('memory_content').textContent = (await api('/api/files/content?path=' + encodeURIComponent(path))).content; }
      catch (err) { document.getElementById('memory_content').textContent = 'Error: ' + err.message; }
    }

    document.getElementById('tabs').innerHTML = Object.keys(TABS).map(t => `<button data-tab="${t}" onclick="show('${t}')">${t}</button>`).join('');
    show('dashboard');
  </script>
</body>
</html>"##,
    )
}
