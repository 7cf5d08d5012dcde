/// Relational layout for a SQL-backed `LeadStore`.
pub fn create_leads_tables_migration() -> &'static str {
    r#"
    CREATE TABLE IF NOT EXISTS leads_pipeline (
        id UUID PRIMARY KEY,
        hub_id UUID NOT NULL,
        name TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        is_default BOOLEAN NOT NULL DEFAULT FALSE,
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    );

    CREATE UNIQUE INDEX IF NOT EXISTS idx_leads_pipeline_one_default
        ON leads_pipeline(hub_id) WHERE is_default;

    CREATE TABLE IF NOT EXISTS leads_pipeline_stage (
        id UUID PRIMARY KEY,
        hub_id UUID NOT NULL,
        pipeline_id UUID NOT NULL REFERENCES leads_pipeline(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        stage_order INTEGER NOT NULL,
        probability SMALLINT NOT NULL DEFAULT 0 CHECK (probability BETWEEN 0 AND 100),
        color TEXT NOT NULL DEFAULT 'primary',
        auto_win BOOLEAN NOT NULL DEFAULT FALSE,
        auto_lost BOOLEAN NOT NULL DEFAULT FALSE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        CHECK (NOT (auto_win AND auto_lost)),
        UNIQUE (pipeline_id, stage_order)
    );

    CREATE UNIQUE INDEX IF NOT EXISTS idx_leads_stage_one_auto_win
        ON leads_pipeline_stage(pipeline_id) WHERE auto_win;
    CREATE UNIQUE INDEX IF NOT EXISTS idx_leads_stage_one_auto_lost
        ON leads_pipeline_stage(pipeline_id) WHERE auto_lost;

    CREATE TABLE IF NOT EXISTS leads_loss_reason (
        id UUID PRIMARY KEY,
        hub_id UUID NOT NULL,
        name TEXT NOT NULL,
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        sort_order INTEGER NOT NULL DEFAULT 0,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    );

    CREATE TABLE IF NOT EXISTS leads_lead (
        id UUID PRIMARY KEY,
        hub_id UUID NOT NULL,
        name TEXT NOT NULL,
        email TEXT,
        phone TEXT,
        company TEXT,
        value NUMERIC(12, 2) NOT NULL DEFAULT 0 CHECK (value >= 0),
        expected_close_date DATE,
        pipeline_id UUID NOT NULL REFERENCES leads_pipeline(id) ON DELETE RESTRICT,
        stage_id UUID NOT NULL REFERENCES leads_pipeline_stage(id) ON DELETE RESTRICT,
        assigned_to UUID,
        customer_ref TEXT,
        converted BOOLEAN NOT NULL DEFAULT FALSE,
        source TEXT NOT NULL DEFAULT 'manual',
        priority TEXT NOT NULL DEFAULT 'medium',
        notes TEXT,
        status TEXT NOT NULL DEFAULT 'open' CHECK (status IN ('open', 'won', 'lost')),
        won_date TIMESTAMPTZ,
        lost_date TIMESTAMPTZ,
        loss_reason_id UUID REFERENCES leads_loss_reason(id) ON DELETE RESTRICT,
        stage_changed_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        version BIGINT NOT NULL DEFAULT 0,
        conversion_claim UUID,
        conversion_claim_expires_at TIMESTAMPTZ,
        CHECK ((status = 'lost') = (loss_reason_id IS NOT NULL))
    );

    CREATE INDEX IF NOT EXISTS idx_leads_lead_hub_status ON leads_lead(hub_id, status);
    CREATE INDEX IF NOT EXISTS idx_leads_lead_hub_stage ON leads_lead(hub_id, pipeline_id, stage_id);

    CREATE TABLE IF NOT EXISTS leads_activity (
        seq BIGSERIAL PRIMARY KEY,
        id UUID NOT NULL UNIQUE,
        hub_id UUID NOT NULL,
        lead_id UUID NOT NULL REFERENCES leads_lead(id) ON DELETE CASCADE,
        activity_type TEXT NOT NULL,
        body TEXT NOT NULL,
        metadata JSONB NOT NULL DEFAULT '{}',
        actor_id UUID,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    );

    CREATE INDEX IF NOT EXISTS idx_leads_activity_lead ON leads_activity(lead_id, created_at, seq);

    CREATE TABLE IF NOT EXISTS leads_settings (
        hub_id UUID PRIMARY KEY,
        default_pipeline_id UUID REFERENCES leads_pipeline(id) ON DELETE SET NULL,
        default_source TEXT NOT NULL DEFAULT 'manual',
        auto_create_customer_on_win BOOLEAN NOT NULL DEFAULT FALSE,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    );
    "#
}
