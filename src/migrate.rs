use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

const TABLES: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS profiles (
        id TEXT PRIMARY KEY,
        age INTEGER,
        birth_date TEXT,
        gender TEXT,
        height REAL,
        weight REAL,
        conditions TEXT,
        medications TEXT,
        chart_number TEXT,
        nickname TEXT,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS health_logs (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        category TEXT NOT NULL,
        note TEXT,
        logged_at TEXT NOT NULL,
        sub_type TEXT,
        quantity REAL,
        unit TEXT,
        schedule_id TEXT,
        sleep_duration_hours REAL,
        meal_description TEXT,
        image_url TEXT,
        exercise_type TEXT,
        duration_minutes INTEGER,
        heart_rate INTEGER,
        intensity_metrics TEXT,
        medication_name TEXT,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS health_scores (
        chart_number TEXT NOT NULL,
        score_date TEXT NOT NULL,
        score REAL NOT NULL,
        PRIMARY KEY (chart_number, score_date)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS daily_score_history (
        user_id TEXT NOT NULL,
        score_date TEXT NOT NULL,
        score INTEGER NOT NULL,
        PRIMARY KEY (user_id, score_date)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_points (
        user_id TEXT PRIMARY KEY,
        daily_points INTEGER NOT NULL DEFAULT 0,
        annual_points INTEGER NOT NULL DEFAULT 0,
        last_updated_date TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS schedules (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        category TEXT NOT NULL,
        sub_type TEXT,
        title TEXT NOT NULL,
        description TEXT,
        frequency TEXT NOT NULL DEFAULT 'daily',
        scheduled_time TEXT,
        days_of_week TEXT,
        day_of_month INTEGER,
        is_active INTEGER NOT NULL DEFAULT 1,
        notification_enabled INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS cycle_logs (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        start_date TEXT NOT NULL,
        end_date TEXT,
        cycle_length INTEGER,
        notes TEXT,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS push_subscriptions (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        endpoint TEXT NOT NULL UNIQUE,
        p256dh TEXT NOT NULL,
        auth TEXT NOT NULL,
        user_agent TEXT,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS notification_settings (
        user_id TEXT PRIMARY KEY,
        enabled INTEGER NOT NULL DEFAULT 1,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS drug_master (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        product_name TEXT NOT NULL UNIQUE,
        main_ingredient TEXT,
        company_name TEXT,
        item_seq TEXT,
        ee_doc_data TEXT,
        ud_doc_data TEXT,
        nb_doc_data TEXT,
        paper_insight TEXT,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_medications (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        drug_id INTEGER NOT NULL,
        is_active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS dni_logic (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        ingredient_name TEXT NOT NULL,
        target_nutrient TEXT NOT NULL,
        warning_level TEXT NOT NULL DEFAULT 'caution',
        message TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS search_logs (
        keyword TEXT PRIMARY KEY,
        call_count INTEGER NOT NULL DEFAULT 0,
        last_searched_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS food_knowledge (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        food_name TEXT NOT NULL,
        clinical_insight TEXT,
        synthetic_qa TEXT,
        calories REAL,
        protein REAL,
        fat REAL,
        carbs REAL,
        sodium REAL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS paper_chunks (
        id TEXT PRIMARY KEY,
        pmid TEXT NOT NULL,
        title TEXT NOT NULL,
        abstract TEXT,
        citation_count INTEGER NOT NULL DEFAULT 0,
        tldr TEXT,
        chunk_text TEXT NOT NULL,
        embedding BLOB,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_groups (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS group_members (
        group_id TEXT NOT NULL REFERENCES user_groups(id) ON DELETE CASCADE,
        chart_number TEXT NOT NULL,
        joined_at TEXT NOT NULL,
        PRIMARY KEY (group_id, chart_number)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS chat_usage (
        user_id TEXT NOT NULL,
        usage_date TEXT NOT NULL,
        count INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (user_id, usage_date)
    )
    "#,
];

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_health_logs_user_logged ON health_logs(user_id, logged_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_health_logs_logged ON health_logs(logged_at)",
    "CREATE INDEX IF NOT EXISTS idx_health_scores_date ON health_scores(score_date, score DESC)",
    "CREATE INDEX IF NOT EXISTS idx_schedules_user_category ON schedules(user_id, category)",
    "CREATE INDEX IF NOT EXISTS idx_cycle_logs_user_start ON cycle_logs(user_id, start_date DESC)",
    "CREATE INDEX IF NOT EXISTS idx_profiles_chart ON profiles(chart_number)",
    "CREATE INDEX IF NOT EXISTS idx_group_members_chart ON group_members(chart_number)",
    "CREATE INDEX IF NOT EXISTS idx_dni_logic_ingredient ON dni_logic(ingredient_name)",
    "CREATE INDEX IF NOT EXISTS idx_food_knowledge_name ON food_knowledge(food_name)",
    "CREATE INDEX IF NOT EXISTS idx_paper_chunks_pmid ON paper_chunks(pmid)",
    "CREATE INDEX IF NOT EXISTS idx_paper_chunks_citations ON paper_chunks(citation_count DESC)",
    "CREATE INDEX IF NOT EXISTS idx_user_medications_user ON user_medications(user_id, is_active)",
];

/// Creates every table and index on an open pool. Idempotent.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    for statement in TABLES {
        sqlx::query(statement).execute(pool).await?;
    }
    for statement in INDEXES {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::open(config).await?;
    tracing::info!(path = %config.db.path.display(), "database schema is up to date");
    pool.close().await;
    Ok(())
}
