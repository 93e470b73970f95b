pub const CREATE_TABLES: &str = "
CREATE TABLE IF NOT EXISTS jobs (
    id TEXT PRIMARY KEY,
    definition_id INTEGER,
    state TEXT NOT NULL,
    outcome TEXT,
    targets TEXT NOT NULL,
    policy TEXT NOT NULL,
    tool_status TEXT NOT NULL,
    parse_errors TEXT NOT NULL DEFAULT '{}',
    finding_count_critical INTEGER DEFAULT 0,
    finding_count_high INTEGER DEFAULT 0,
    finding_count_medium INTEGER DEFAULT 0,
    finding_count_low INTEGER DEFAULT 0,
    finding_count_info INTEGER DEFAULT 0,
    risk_score INTEGER DEFAULT 0,
    error_message TEXT,
    created_at TEXT NOT NULL,
    started_at TEXT,
    finished_at TEXT
);

CREATE TABLE IF NOT EXISTS findings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id TEXT NOT NULL,
    position INTEGER NOT NULL,
    tool TEXT NOT NULL,
    severity TEXT NOT NULL,
    target TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT,
    raw TEXT NOT NULL,
    discovered_at TEXT NOT NULL
);

-- no foreign key: lines are flushed while the job row does not exist yet
CREATE TABLE IF NOT EXISTS job_logs (
    job_id TEXT NOT NULL,
    seq INTEGER NOT NULL,
    ts TEXT NOT NULL,
    tool TEXT NOT NULL,
    stream TEXT NOT NULL,
    text TEXT NOT NULL,
    PRIMARY KEY (job_id, seq)
);

CREATE TABLE IF NOT EXISTS scan_definitions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    policy TEXT NOT NULL,
    targets TEXT NOT NULL,
    cron TEXT,
    created_at TEXT NOT NULL,
    last_fired_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_findings_job ON findings(job_id, position);
CREATE INDEX IF NOT EXISTS idx_findings_severity ON findings(severity);
CREATE INDEX IF NOT EXISTS idx_jobs_created ON jobs(created_at);
CREATE INDEX IF NOT EXISTS idx_jobs_definition ON jobs(definition_id);
";
