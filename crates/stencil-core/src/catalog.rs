//! Static, versioned catalog of node classes and example scripts. Scripts
//! can only instantiate classes listed here.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy)]
pub struct Service {
    pub name: &'static str,
    pub classes: &'static [&'static str],
}

#[derive(Debug, Clone, Copy)]
pub struct Provider {
    pub name: &'static str,
    pub services: &'static [Service],
}

macro_rules! provider {
    ($name:literal { $($service:literal => [$($class:literal),* $(,)?]),* $(,)? }) => {
        Provider {
            name: $name,
            services: &[$(Service { name: $service, classes: &[$($class),*] }),*],
        }
    };
}

/// Registration order matters: later providers shadow earlier ones.
pub static PROVIDERS: &[Provider] = &[
    provider!("azure" {
        "analytics" => ["DataExplorerClusters", "DataFactories", "Databricks", "EventHubs", "HDInsightClusters", "LogAnalyticsWorkspaces", "StreamAnalyticsJobs", "SynapseAnalytics"],
        "compute" => ["AppServices", "AutomanagedVM", "BatchAccounts", "ContainerApps", "ContainerInstances", "ContainerRegistries", "FunctionApps", "KubernetesServices", "VM", "VMScaleSet"],
        "database" => ["CacheForRedis", "CosmosDb", "DatabaseForMariadbServers", "DatabaseForMysqlServers", "DatabaseForPostgresqlServers", "SQLDatabases", "SQLManagedInstances", "SQLServers"],
        "devops" => ["ApplicationInsights", "Devops", "Pipelines", "Repos"],
        "general" => ["Resourcegroups", "Subscriptions", "Usericon"],
        "identity" => ["ActiveDirectory", "ManagedIdentities", "EntraIDProtection"],
        "integration" => ["APIManagement", "EventGridTopics", "LogicApps", "ServiceBus"],
        "iot" => ["IotHub", "DigitalTwins"],
        "ml" => ["AzureOpenAI", "CognitiveServices", "MachineLearningServiceWorkspaces", "BotServices"],
        "network" => ["ApplicationGateway", "CDNProfiles", "DNSZones", "Firewall", "FrontDoors", "LoadBalancers", "PrivateEndpoint", "PublicIpAddresses", "Subnets", "TrafficManagerProfiles", "VirtualNetworks"],
        "security" => ["KeyVaults", "Sentinel", "SecurityCenter"],
        "storage" => ["BlobStorage", "DataLakeStorage", "StorageAccounts", "TableStorage", "QueuesStorage"],
        "web" => ["AppServicePlans", "StaticApps", "Search"],
    }),
    provider!("aws" {
        "analytics" => ["Athena", "Glue", "Kinesis", "Quicksight", "Redshift"],
        "compute" => ["EC2", "ECS", "EKS", "Fargate", "Lambda", "Batch"],
        "database" => ["Aurora", "Dynamodb", "ElastiCache", "RDS"],
        "integration" => ["Eventbridge", "SNS", "SQS", "StepFunctions"],
        "management" => ["Cloudwatch", "Cloudformation"],
        "ml" => ["Sagemaker", "Bedrock", "Rekognition"],
        "network" => ["APIGateway", "CloudFront", "ELB", "Route53", "VPC", "NATGateway"],
        "security" => ["IAM", "KMS", "SecretsManager", "WAF", "Cognito"],
        "storage" => ["S3", "EFS", "ElasticBlockStoreEBS"],
    }),
    provider!("gcp" {
        "analytics" => ["Bigquery", "Dataflow", "Pubsub"],
        "compute" => ["AppEngine", "ComputeEngine", "Functions", "GKE", "Run"],
        "database" => ["Bigtable", "Firestore", "Memorystore", "SQL", "Spanner"],
        "ml" => ["VertexAI", "AutoML"],
        "network" => ["CDN", "DNS", "LoadBalancing", "VPN"],
        "storage" => ["GCS", "Filestore"],
    }),
    provider!("saas" {
        "alerting" => ["Opsgenie", "Pagerduty"],
        "cdn" => ["Cloudflare", "Akamai"],
        "chat" => ["Slack", "Teams", "Discord"],
        "identity" => ["Auth0", "Okta"],
        "logging" => ["Datadog", "Newrelic"],
    }),
    provider!("onprem" {
        "analytics" => ["Spark", "Hadoop", "Flink"],
        "ci" => ["GithubActions", "Jenkins", "GitlabCI"],
        "client" => ["Client", "User", "Users"],
        "compute" => ["Server", "Nomad"],
        "container" => ["Docker", "Containerd"],
        "database" => ["Cassandra", "MongoDB", "MySQL", "PostgreSQL", "Mssql", "Neo4J"],
        "inmemory" => ["Memcached", "Redis"],
        "monitoring" => ["Grafana", "Prometheus"],
        "network" => ["Envoy", "Haproxy", "Istio", "Nginx", "Traefik"],
        "queue" => ["Kafka", "RabbitMQ", "ActiveMQ"],
        "storage" => ["Ceph"],
    }),
    provider!("gis" {
        "database" => ["Postgis"],
        "server" => ["Geoserver", "Mapserver"],
    }),
    provider!("elastic" {
        "elasticsearch" => ["Elasticsearch", "Kibana", "Logstash", "Beats"],
    }),
    provider!("programming" {
        "flowchart" => ["Action", "Database", "Decision", "Document", "InputOutput", "StartEnd"],
        "framework" => ["Django", "Fastapi", "Flask", "React", "Spring"],
        "language" => ["Go", "Java", "Nodejs", "Python", "Rust", "Typescript"],
    }),
    provider!("generic" {
        "blank" => ["Blank"],
        "compute" => ["Rack"],
        "database" => ["SQL"],
        "device" => ["Mobile", "Tablet"],
        "network" => ["Firewall", "Router", "Switch", "VPN"],
        "storage" => ["Storage"],
    }),
    provider!("k8s" {
        "compute" => ["Cronjob", "Deploy", "DaemonSet", "Job", "Pod", "ReplicaSet", "StatefulSet"],
        "network" => ["Endpoint", "Ingress", "NetworkPolicy", "Service"],
        "podconfig" => ["ConfigMap", "Secret"],
        "rbac" => ["ClusterRole", "Group", "Role", "ServiceAccount", "User"],
        "storage" => ["PV", "PVC", "StorageClass"],
        "clusterconfig" => ["HPA", "LimitRange", "Quota"],
    }),
];

// --- Icons ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct IconCatalog {
    /// provider -> service -> sorted class names
    pub providers: BTreeMap<String, BTreeMap<String, Vec<String>>>,
    pub filtered: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_info: Option<BTreeMap<String, String>>,
}

fn matches_filter(name: &str, filter: Option<&str>) -> bool {
    match filter {
        Some(f) if !f.is_empty() => name.to_lowercase().contains(&f.to_lowercase()),
        _ => true,
    }
}

/// List available icons, optionally narrowed by case-insensitive substring
/// filters on provider and service names.
pub fn list_icons(provider_filter: Option<&str>, service_filter: Option<&str>) -> IconCatalog {
    let provider_filter = provider_filter.filter(|f| !f.is_empty());
    let service_filter = service_filter.filter(|f| !f.is_empty());
    let mut providers = BTreeMap::new();
    for provider in PROVIDERS {
        if !matches_filter(provider.name, provider_filter) {
            continue;
        }
        let services: BTreeMap<String, Vec<String>> = provider
            .services
            .iter()
            .filter(|s| matches_filter(s.name, service_filter) && !s.classes.is_empty())
            .map(|s| {
                let mut classes: Vec<String> = s.classes.iter().map(|c| c.to_string()).collect();
                classes.sort();
                (s.name.to_string(), classes)
            })
            .collect();
        if !services.is_empty() {
            providers.insert(provider.name.to_string(), services);
        }
    }

    let filtered = provider_filter.is_some() || service_filter.is_some();
    let filter_info = filtered.then(|| {
        let mut info = BTreeMap::new();
        if let Some(p) = provider_filter {
            info.insert("provider_filter".to_string(), p.to_string());
        }
        if let Some(s) = service_filter {
            info.insert("service_filter".to_string(), s.to_string());
        }
        info
    });

    IconCatalog {
        providers,
        filtered,
        filter_info,
    }
}

// --- Examples ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum DiagramType {
    Azure,
    Sequence,
    Flow,
    Class,
    K8s,
    Onprem,
    Custom,
    #[default]
    All,
}

impl DiagramType {
    pub const ALL_KINDS: [DiagramType; 7] = [
        DiagramType::Azure,
        DiagramType::Sequence,
        DiagramType::Flow,
        DiagramType::Class,
        DiagramType::K8s,
        DiagramType::Onprem,
        DiagramType::Custom,
    ];

    /// Unknown names fall back to `All`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "azure" => DiagramType::Azure,
            "sequence" => DiagramType::Sequence,
            "flow" => DiagramType::Flow,
            "class" => DiagramType::Class,
            "k8s" => DiagramType::K8s,
            "onprem" => DiagramType::Onprem,
            "custom" => DiagramType::Custom,
            _ => DiagramType::All,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DiagramType::Azure => "azure",
            DiagramType::Sequence => "sequence",
            DiagramType::Flow => "flow",
            DiagramType::Class => "class",
            DiagramType::K8s => "k8s",
            DiagramType::Onprem => "onprem",
            DiagramType::Custom => "custom",
            DiagramType::All => "all",
        }
    }
}

impl fmt::Display for DiagramType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const AZURE_EXAMPLES: &[(&str, &str)] = &[
    (
        "azure_basic",
        r#"with Diagram("Web Application Architecture", show=False):
    AppServices("App Service") >> CosmosDb("Cosmos DB")"#,
    ),
    (
        "azure_grouped_workers",
        r#"with Diagram("Scaled Worker Architecture", show=False, direction="TB"):
    ApplicationGateway("Gateway") >> [FunctionApps("worker1"),
                  FunctionApps("worker2"),
                  FunctionApps("worker3"),
                  FunctionApps("worker4"),
                  FunctionApps("worker5")] >> EventHubs("Events")"#,
    ),
    (
        "azure_clustered_web_services",
        r#"with Diagram("Clustered Web Services", show=False):
    dns = DNSZones("Azure DNS")
    lb = LoadBalancers("Load Balancer")

    with Cluster("App Services"):
        svc_group = [AppServices("web1"),
                     AppServices("web2"),
                     AppServices("web3")]

    with Cluster("Database Cluster"):
        db_primary = SQLDatabases("Primary DB")
        db_primary - [SQLDatabases("Read Replica")]

    cache = CacheForRedis("Redis Cache")

    dns >> lb >> svc_group
    svc_group >> db_primary
    svc_group >> cache"#,
    ),
    (
        "azure_event_processing",
        r#"with Diagram("Event Processing", show=False):
    source = KubernetesServices("AKS Source")

    with Cluster("Event Flows"):
        with Cluster("Event Workers"):
            workers = [ContainerInstances("worker1"),
                       ContainerInstances("worker2"),
                       ContainerInstances("worker3")]

        queue = ServiceBus("Service Bus")

        with Cluster("Processing"):
            handlers = [FunctionApps("func1"),
                        FunctionApps("func2"),
                        FunctionApps("func3")]

    store = BlobStorage("Blob Storage")
    dw = SynapseAnalytics("Synapse Analytics")

    source >> workers >> queue >> handlers
    handlers >> store
    handlers >> dw"#,
    ),
    (
        "azure_ai_services",
        r#"with Diagram("AI-Powered Image Processing", show=False, direction="LR"):
    user = User("User")

    with Cluster("Azure Storage"):
        input_blob = BlobStorage("Input Container")
        output_blob = BlobStorage("Output Container")

    function = FunctionApps("Image Processor")
    ai = CognitiveServices("Azure AI Vision")

    user >> Edge(label="Upload Image") >> input_blob
    input_blob >> Edge(label="Trigger") >> function
    function >> Edge(label="Analyze Image") >> ai
    ai >> Edge(label="Return Results") >> function
    function >> Edge(label="Save Results") >> output_blob
    output_blob >> Edge(label="Download") >> user"#,
    ),
];

const SEQUENCE_EXAMPLES: &[(&str, &str)] = &[(
    "sequence_basic",
    r#"with Diagram("Service Interaction", show=False, direction="LR"):
    user = User("Client")
    web = Server("Web Server")
    db = PostgreSQL("Database")

    user >> Edge(label="1. Request") >> web
    web >> Edge(label="2. Query") >> db
    db >> Edge(label="3. Result") >> web
    web >> Edge(label="4. Response") >> user"#,
)];

const FLOW_EXAMPLES: &[(&str, &str)] = &[(
    "flow_basic",
    r#"with Diagram("Data Processing Flow", show=False, direction="LR"):
    start = User("Start")

    with Cluster("Processing"):
        step1 = Server("Validate")
        step2 = Server("Transform")
        step3 = Server("Enrich")

    store = PostgreSQL("Data Store")

    start >> step1 >> step2 >> step3 >> store"#,
)];

const CLASS_EXAMPLES: &[(&str, &str)] = &[(
    "class_basic",
    r#"with Diagram("Service Architecture", show=False):
    with Cluster("Frontend"):
        web = Server("Web App")

    with Cluster("Backend"):
        api = Server("API Server")
        worker = Server("Worker")

    with Cluster("Data Layer"):
        db = PostgreSQL("Database")
        cache = Redis("Cache")

    web >> api
    api >> db
    api >> cache
    api >> worker
    worker >> db"#,
)];

const K8S_EXAMPLES: &[(&str, &str)] = &[
    (
        "k8s_basic",
        r#"with Diagram("Kubernetes Deployment", show=False):
    ing = Ingress("Ingress")

    with Cluster("Namespace"):
        svc = Service("Service")
        pods = [Pod("pod1"), Pod("pod2"), Pod("pod3")]
        svc >> pods

    pv = PV("Persistent Volume")
    ing >> svc
    pods >> pv"#,
    ),
    (
        "k8s_stateful",
        r#"with Diagram("Stateful Application", show=False):
    ing = Ingress("Ingress")

    with Cluster("Application"):
        svc = Service("Service")
        sts = StatefulSet("StatefulSet")
        pods = [Pod("pod1"), Pod("pod2"), Pod("pod3")]

    with Cluster("Storage"):
        pvcs = [PVC("pvc1"), PVC("pvc2"), PVC("pvc3")]
        sc = StorageClass("StorageClass")

    ing >> svc >> sts
    sts >> pods
    for pod in pods:
        pod >> pvcs[0]
    pvcs >> sc"#,
    ),
];

const ONPREM_EXAMPLES: &[(&str, &str)] = &[(
    "onprem_basic",
    r#"with Diagram("On-Premises Architecture", show=False):
    lb = Nginx("Load Balancer")

    with Cluster("Application Servers"):
        apps = [Server("app1"),
                Server("app2"),
                Server("app3")]

    with Cluster("Database Cluster"):
        primary = PostgreSQL("Primary")
        replica = PostgreSQL("Replica")
        primary - replica

    cache = Redis("Cache")

    lb >> apps
    apps >> primary
    apps >> cache"#,
)];

const CUSTOM_EXAMPLES: &[(&str, &str)] = &[(
    "custom_icon",
    r#"# Custom icons are read from a local file next to the output directory.
rabbitmq_icon = "rabbitmq.png"

with Diagram("Message Broker Architecture", show=False):
    producer = Server("Producer")
    consumer = Server("Consumer")
    queue = Custom("RabbitMQ", rabbitmq_icon)

    producer >> queue >> consumer"#,
)];

fn examples_of(kind: DiagramType) -> &'static [(&'static str, &'static str)] {
    match kind {
        DiagramType::Azure => AZURE_EXAMPLES,
        DiagramType::Sequence => SEQUENCE_EXAMPLES,
        DiagramType::Flow => FLOW_EXAMPLES,
        DiagramType::Class => CLASS_EXAMPLES,
        DiagramType::K8s => K8S_EXAMPLES,
        DiagramType::Onprem => ONPREM_EXAMPLES,
        DiagramType::Custom => CUSTOM_EXAMPLES,
        DiagramType::All => &[],
    }
}

/// Example scripts keyed by example name.
pub fn examples(kind: DiagramType) -> BTreeMap<String, String> {
    let kinds: &[DiagramType] = if kind == DiagramType::All {
        &DiagramType::ALL_KINDS
    } else {
        std::slice::from_ref(&kind)
    };
    kinds
        .iter()
        .flat_map(|k| examples_of(*k).iter())
        .map(|(name, code)| (name.to_string(), code.to_string()))
        .collect()
}
