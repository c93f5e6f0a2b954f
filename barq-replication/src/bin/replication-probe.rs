//! Drives the replication state machine against the in-memory test fakes
//! for a single document write, printing the resulting shard info.
//! Useful for exercising the retry/fan-out logic without a real storage
//! engine or transport layer wired up.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use barq_replication::test_support::{
    TestClusterStateObserver, TestIndexShard, TestReplicasProxy,
};
use barq_replication::{
    ClusterBlocks, ClusterState, HasShardId, HasShardInfo, IndexMetadata, IndexShard,
    IndexShardRoutingTable, LocalShardRegistry, NodeId, PrimaryResult, PrimaryTerm,
    ReplicationAction, ReplicationError, ReplicationRequest, ReplicationSettings, ResolveRequest,
    RoutingEntry, ShardId, ShardInfo, ShardOperationOnPrimary, ShardRole, ShardRoutingState,
    Transport, WaitForActiveShards,
};
use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum WaitOption {
    None,
    One,
    All,
}

impl From<WaitOption> for WaitForActiveShards {
    fn from(value: WaitOption) -> Self {
        match value {
            WaitOption::None => WaitForActiveShards::None,
            WaitOption::One => WaitForActiveShards::One,
            WaitOption::All => WaitForActiveShards::All,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "replication-probe",
    about = "Exercise the replication core's primary/replica fan-out against in-memory fakes"
)]
struct Cli {
    /// Document body to index.
    #[arg(long, default_value = "hello world")]
    body: String,

    /// Number of started replica copies to simulate.
    #[arg(long, default_value_t = 2)]
    replicas: u32,

    /// How many copies must be active before replication proceeds.
    #[arg(long, value_enum, default_value_t = WaitOption::One)]
    wait_for_active_shards: WaitOption,
}

#[derive(Debug)]
struct DocResponse {
    doc_id: String,
    shard_info: Option<ShardInfo>,
}

impl HasShardInfo for DocResponse {
    fn set_shard_info(&mut self, info: ShardInfo) {
        self.shard_info = Some(info);
    }
}

struct SingleShardResolver {
    shard_id: ShardId,
}

impl ResolveRequest<ReplicationRequest<String>> for SingleShardResolver {
    fn index_name(&self, _request: &ReplicationRequest<String>) -> String {
        "probe-index".to_string()
    }

    fn resolve(
        &self,
        request: &mut ReplicationRequest<String>,
        _metadata: &IndexMetadata,
        default_wait_for_active_shards: WaitForActiveShards,
    ) -> Result<ShardId, ReplicationError> {
        request.set_shard_id(self.shard_id);
        if matches!(request.wait_for_active_shards, WaitForActiveShards::Default) {
            request.wait_for_active_shards = default_wait_for_active_shards;
        }
        Ok(self.shard_id)
    }
}

struct IndexDocOnPrimary;

#[async_trait]
impl ShardOperationOnPrimary for IndexDocOnPrimary {
    type Request = ReplicationRequest<String>;
    type ReplicaRequest = String;
    type Response = DocResponse;

    async fn execute(
        &self,
        request: Self::Request,
        _shard: &dyn IndexShard,
    ) -> Result<PrimaryResult<Self::ReplicaRequest, Self::Response>, ReplicationError> {
        Ok(PrimaryResult::new(
            request.payload.clone(),
            DocResponse {
                doc_id: format!("doc-{}", request.payload.len()),
                shard_info: None,
            },
        ))
    }
}

struct UnreachableTransport;

#[async_trait]
impl Transport<ReplicationRequest<String>, DocResponse> for UnreachableTransport {
    async fn forward_to_primary(
        &self,
        _node: &NodeId,
        _request: ReplicationRequest<String>,
    ) -> Result<DocResponse, ReplicationError> {
        Err(ReplicationError::Other(
            "probe is single-node; remote dispatch should never trigger".into(),
        ))
    }

    async fn forward_to_relocation_target(
        &self,
        _node: &NodeId,
        _relocation_id: barq_replication::AllocationId,
        _primary_term: PrimaryTerm,
        _request: ReplicationRequest<String>,
    ) -> Result<DocResponse, ReplicationError> {
        Err(ReplicationError::Other(
            "probe never simulates relocation".into(),
        ))
    }
}

struct RegistryOf(Arc<TestIndexShard>);

impl LocalShardRegistry for RegistryOf {
    fn get(&self, shard_id: ShardId) -> Option<Arc<dyn IndexShard>> {
        if shard_id == self.0.shard_id() {
            Some(self.0.clone())
        } else {
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let index_uuid = uuid::Uuid::nil();
    let shard_id = ShardId::new(index_uuid, 0);
    let local_node = NodeId::new("local");

    let shard = Arc::new(TestIndexShard::new_primary(index_uuid, 0, PrimaryTerm(1)));
    let target_allocation_id = shard.allocation_id();

    let replicas: Vec<RoutingEntry> = (0..cli.replicas)
        .map(|i| RoutingEntry {
            allocation_id: barq_replication::AllocationId::new(format!("replica-{i}")),
            role: ShardRole::Replica,
            state: ShardRoutingState::Started,
            current_node_id: NodeId::new(format!("node-{i}")),
            relocating_node_id: None,
            relocation_id: None,
        })
        .collect();

    let routing_table = IndexShardRoutingTable {
        shard_id,
        primary: RoutingEntry {
            allocation_id: target_allocation_id,
            role: ShardRole::Primary,
            state: ShardRoutingState::Started,
            current_node_id: local_node.clone(),
            relocating_node_id: None,
            relocation_id: None,
        },
        replicas,
    };

    let mut primary_terms = HashMap::new();
    primary_terms.insert(0u32, PrimaryTerm(1));
    let mut indices = HashMap::new();
    indices.insert(
        index_uuid,
        IndexMetadata {
            index_uuid,
            index_name: "probe-index".to_string(),
            closed: false,
            shadow_replicas: false,
            primary_terms,
        },
    );
    let mut routing = HashMap::new();
    routing.insert(shard_id, routing_table);

    let state = ClusterState {
        version: 1,
        nodes: vec![local_node.clone()],
        routing_table: routing,
        indices,
        blocks: ClusterBlocks::default(),
    };

    let action = ReplicationAction {
        local_node,
        observer: Arc::new(TestClusterStateObserver::new(state)),
        resolver: Arc::new(SingleShardResolver { shard_id }),
        local_shards: Arc::new(RegistryOf(shard)),
        primary_op: Arc::new(IndexDocOnPrimary),
        replicas_proxy: Arc::new(TestReplicasProxy::always_succeeds()),
        transport: Arc::new(UnreachableTransport),
        settings: ReplicationSettings {
            default_wait_for_active_shards: cli.wait_for_active_shards.into(),
            ..ReplicationSettings::default()
        },
    };

    let request = ReplicationRequest::new(cli.body, Duration::from_secs(5));
    let response = action.dispatch(request).await?;

    println!("indexed {}", response.doc_id);
    if let Some(info) = response.shard_info {
        println!(
            "replicated to {}/{} copies ({} failed)",
            info.successful,
            info.total,
            info.failed.len()
        );
    }

    Ok(())
}
