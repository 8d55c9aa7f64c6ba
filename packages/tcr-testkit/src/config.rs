use tcr_config::Config;

/// Small dimensions and near-zero delays so jobs and retries finish quickly.
const TEST_CONFIG: &str = r#"
[service]
http_bind = "127.0.0.1:0"
log_level = "debug"

[storage.qdrant]
url        = "http://127.0.0.1:6334"
collection = "tcr_test"
vector_dim = 16
timeout_ms = 1000

[providers.embedding]
provider_id = "test"
api_base    = "http://127.0.0.1:1"
api_key     = "test-key"
path        = "/v1/embeddings"
model       = "test-embedding"
dimensions  = 16
timeout_ms  = 1000

[providers.scoring]
provider_id = "test"
api_base    = "http://127.0.0.1:1"
api_key     = "test-key"
path        = "/v1/chat/completions"
model       = "test-scoring"
temperature = 0.0
timeout_ms  = 1000

[preprocess.abbreviations]
pwd  = "password"
auth = "authentication"

[preprocess.synonyms]
reset = ["recover", "change"]
login = ["sign in"]

[search]
default_limit        = 10
concurrency_limit    = 4
retriever_timeout_ms = 1000

[search.weights]
keyword = 0.5
vector  = 0.5

[search.retry]
max_attempts    = 2
base_backoff_ms = 1
max_backoff_ms  = 5

[rerank]
enabled        = false
max_candidates = 20
concurrency    = 4

[dedupe]
enabled              = false
similarity_threshold = 0.9
measure              = "jaccard"
summarize            = false
summary_max_chars    = 80

[jobs]
retention_secs       = 60
purge_interval_secs  = 1
batch_size           = 2
concurrency          = 1
inter_batch_delay_ms = 0
max_attempts         = 2
base_backoff_ms      = 1
max_backoff_ms       = 5
cost_per_1k_tokens   = 0.5
"#;

pub const TEST_VECTOR_DIM: u32 = 16;

/// A valid configuration for in-memory tests.
pub fn test_config() -> Config {
	let cfg: Config = toml::from_str(TEST_CONFIG).expect("Test config must parse.");

	tcr_config::validate(&cfg).expect("Test config must be valid.");

	cfg
}
