//! RPC Module Tests
//!
//! Frame codec round-trips, the oversized-frame guard, the task-to-container
//! mapping, and the client's error classification against a hand-rolled
//! in-process worker speaking the real wire protocol.

#[cfg(test)]
mod tests {
    use crate::rpc::client::{container_spec, RpcClient, RpcError, WorkerClient};
    use crate::rpc::protocol::{
        read_frame, write_frame, Container, ContainerState, Volume, WorkerInfo, WorkerRequest,
        WorkerResponse, MAX_FRAME_LEN,
    };
    use crate::tasks::types::{Executor, Input, Output, Task};

    use std::collections::HashMap;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    fn container() -> Container {
        Container {
            id: "task-1".to_string(),
            image: "alpine".to_string(),
            command: vec!["echo".to_string(), "hi".to_string()],
            work_dir: "/work".to_string(),
            env: HashMap::from([("KEY".to_string(), "value".to_string())]),
            inputs: vec![Volume {
                host_path: "/nfs/in.fq".to_string(),
                container_path: "/data/in.fq".to_string(),
            }],
            outputs: vec![Volume {
                host_path: "/nfs/out.bam".to_string(),
                container_path: "/data/out.bam".to_string(),
            }],
        }
    }

    // ============================================================
    // TEST 1: Frame codec
    // ============================================================

    #[tokio::test]
    async fn test_request_frame_round_trip() {
        let (mut a, mut b) = tokio::io::duplex(64 * 1024);

        write_frame(&mut a, &WorkerRequest::RunContainer(container()))
            .await
            .unwrap();
        let decoded: WorkerRequest = read_frame(&mut b).await.unwrap();

        match decoded {
            WorkerRequest::RunContainer(c) => {
                assert_eq!(c.id, "task-1");
                assert_eq!(c.command, vec!["echo", "hi"]);
                assert_eq!(c.env["KEY"], "value");
                assert_eq!(c.inputs[0].container_path, "/data/in.fq");
            }
            other => panic!("wrong request decoded: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_response_frame_round_trip() {
        let (mut a, mut b) = tokio::io::duplex(64 * 1024);

        let state = ContainerState {
            running: false,
            exited: true,
            exit_code: 7,
            stdout: "partial\n".to_string(),
            stderr: "boom\n".to_string(),
            ..ContainerState::default()
        };
        write_frame(&mut a, &WorkerResponse::State(state))
            .await
            .unwrap();
        let decoded: WorkerResponse = read_frame(&mut b).await.unwrap();

        match decoded {
            WorkerResponse::State(s) => {
                assert!(s.exited);
                assert_eq!(s.exit_code, 7);
                assert_eq!(s.stdout, "partial\n");
            }
            other => panic!("wrong response decoded: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_multiple_frames_on_one_stream() {
        let (mut a, mut b) = tokio::io::duplex(64 * 1024);

        write_frame(&mut a, &WorkerRequest::GetInfo).await.unwrap();
        write_frame(&mut a, &WorkerRequest::StopContainer(container()))
            .await
            .unwrap();

        assert!(matches!(
            read_frame::<_, WorkerRequest>(&mut b).await.unwrap(),
            WorkerRequest::GetInfo
        ));
        assert!(matches!(
            read_frame::<_, WorkerRequest>(&mut b).await.unwrap(),
            WorkerRequest::StopContainer(_)
        ));
    }

    #[tokio::test]
    async fn test_read_frame_rejects_oversized_length() {
        let (mut a, mut b) = tokio::io::duplex(1024);

        a.write_u32((MAX_FRAME_LEN + 1) as u32).await.unwrap();
        a.flush().await.unwrap();

        let result = read_frame::<_, WorkerRequest>(&mut b).await;
        assert!(result.is_err());
    }

    // ============================================================
    // TEST 2: Task-to-container mapping
    // ============================================================

    #[test]
    fn test_container_spec_maps_executor_and_volumes() {
        let task = Task {
            id: "task-9".to_string(),
            executors: vec![Executor {
                image: "biocontainers/bwa".to_string(),
                command: vec!["bwa".to_string(), "mem".to_string()],
                workdir: "/work".to_string(),
                env: HashMap::from([("THREADS".to_string(), "4".to_string())]),
            }],
            inputs: vec![Input {
                url: "/nfs/ref/genome.fa".to_string(),
                path: "/ref/genome.fa".to_string(),
            }],
            outputs: vec![Output {
                url: "/nfs/run1/out.sam".to_string(),
                path: "/out/out.sam".to_string(),
            }],
            ..Task::default()
        };

        let spec = container_spec(&task);
        assert_eq!(spec.id, "task-9");
        assert_eq!(spec.image, "biocontainers/bwa");
        assert_eq!(spec.work_dir, "/work");
        assert_eq!(spec.env["THREADS"], "4");
        assert_eq!(spec.inputs[0].host_path, "/nfs/ref/genome.fa");
        assert_eq!(spec.outputs[0].container_path, "/out/out.sam");
    }

    // ============================================================
    // TEST 3: Client error classification
    // ============================================================

    /// One-shot worker: accepts a single connection, reads one request and
    /// answers with the scripted response.
    async fn one_shot_worker(response: WorkerResponse) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let _request: WorkerRequest = read_frame(&mut stream).await.unwrap();
            write_frame(&mut stream, &response).await.unwrap();
        });

        address
    }

    #[tokio::test]
    async fn test_client_maps_error_payload_to_logical() {
        let address =
            one_shot_worker(WorkerResponse::Error("no such image".to_string())).await;

        let client = RpcClient::new();
        let result = client.run_container(&address, &container()).await;

        match result {
            Err(RpcError::Logical(message)) => assert_eq!(message, "no such image"),
            other => panic!("expected logical error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_client_connection_refused_is_network_error() {
        // Bind then drop to learn a port that is certainly closed.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let client = RpcClient::new();
        let result = client.get_info(&address).await;
        assert!(matches!(result, Err(RpcError::Network(_))));
    }

    #[tokio::test]
    async fn test_client_reads_info_response() {
        let address = one_shot_worker(WorkerResponse::Info(WorkerInfo {
            cpu_cores: 8,
            ram_gb: 32.0,
            identified_cpu_cores: 16,
            identified_ram_gb: 64.0,
        }))
        .await;

        let client = RpcClient::new();
        let info = client.get_info(&address).await.unwrap();
        assert_eq!(info.cpu_cores, 8);
        assert_eq!(info.identified_cpu_cores, 16);
    }

    #[tokio::test]
    async fn test_client_rejects_mismatched_response_shape() {
        // An Ack where a State is expected is a broken worker, not a broken
        // network.
        let address = one_shot_worker(WorkerResponse::Ack).await;

        let client = RpcClient::new();
        let result = client.check_container(&address, &container()).await;
        assert!(matches!(result, Err(RpcError::Logical(_))));
    }
}
