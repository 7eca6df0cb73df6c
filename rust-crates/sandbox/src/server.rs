use crate::state::{
    Rejection,
    ReserveUpdateError,
    SharedState,
};
use actix_web::{
    App,
    HttpResponse,
    HttpServer,
    dev::ServerHandle,
    web,
};
use anyhow::Context;
use chrono::Utc;
use claim_engine::{
    AccountId,
    CommitmentLevel,
    ProgramId,
    SignedClaim,
    TxHandle,
    TxStatus,
    wire::{
        AllocationStateDto,
        BalanceDto,
        ErrorDetailDto,
        MemberDto,
        ReserveUpdateDto,
        SubmitClaimRejection,
        SubmitClaimResponse,
        TransactionStatusDto,
    },
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    net::TcpListener,
    thread::JoinHandle,
};

#[derive(Debug, Deserialize)]
struct StatusQuery {
    #[serde(default)]
    commitment: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AirdropDto {
    pub amount: u64,
}

/// Ledger gateway and allowlist registry on one local port, served from
/// its own thread.
pub struct SandboxServer {
    state: SharedState,
    base_url: String,
    server_handle: ServerHandle,
    server_thread: Option<JoinHandle<()>>,
}

impl SandboxServer {
    pub fn start(state: SharedState, port: Option<u16>) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port.unwrap_or(0)))
            .context("failed to bind HTTP listener for sandbox")?;
        let address = listener
            .local_addr()
            .context("failed to read listener address")?;
        let base_url = format!("http://{}", address);

        tracing::info!("sandbox listening on {}", base_url);

        let server_state = state.clone();
        let server = HttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(server_state.clone()))
                .route("/programs/{program}/state", web::get().to(handle_state))
                .route("/transactions", web::post().to(handle_submit))
                .route("/transactions/{tx}", web::get().to(handle_status))
                .route("/accounts/{account}/balance", web::get().to(handle_balance))
                .route("/accounts/{account}/airdrop", web::post().to(handle_airdrop))
                .route("/member/{account}", web::get().to(handle_member))
                .route(
                    "/update/{account}/{secret}",
                    web::put().to(handle_update_reserve),
                )
        })
        .workers(2)
        .shutdown_timeout(1)
        .listen(listener)
        .context("failed to start Actix server")?
        .run();

        let server_handle = server.handle();
        let server_thread = std::thread::spawn(move || {
            let sys = actix_web::rt::System::new();
            let _ = sys.block_on(server);
        });

        Ok(Self {
            state,
            base_url,
            server_handle,
            server_thread: Some(server_thread),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }
}

impl Drop for SandboxServer {
    fn drop(&mut self) {
        let _ = self.server_handle.stop(true);
        if let Some(thread) = self.server_thread.take() {
            let _ = thread.join();
        }
    }
}

async fn handle_state(
    state: web::Data<SharedState>,
    program: web::Path<String>,
) -> HttpResponse {
    let program = ProgramId::new(program.into_inner());
    let allocation = state.lock().allocation();
    if allocation.program != program {
        return HttpResponse::NotFound().json(ErrorDetailDto {
            detail: format!("no program {program}"),
        });
    }
    HttpResponse::Ok().json(AllocationStateDto {
        items_available: allocation.items_available,
        items_redeemed: allocation.items_redeemed,
        items_remaining: allocation.items_remaining,
        go_live_at: allocation.go_live_at.timestamp(),
    })
}

async fn handle_submit(
    state: web::Data<SharedState>,
    claim: web::Json<SignedClaim>,
) -> HttpResponse {
    tracing::info!(payer = %claim.transaction.payer, "received claim");
    let result = state.lock().submit(&claim, Utc::now());
    match result {
        Ok(tx) => HttpResponse::Ok().json(SubmitClaimResponse {
            tx: tx.as_str().to_string(),
        }),
        Err(Rejection::UnknownProgram) => HttpResponse::NotFound().json(SubmitClaimRejection {
            code: None,
            message: format!("no program {}", claim.transaction.program),
        }),
        Err(Rejection::BadRequest(message)) => {
            HttpResponse::BadRequest().json(SubmitClaimRejection {
                code: None,
                message,
            })
        }
        Err(Rejection::Program(code)) => {
            HttpResponse::BadRequest().json(SubmitClaimRejection {
                code: Some(code.0),
                message: format!("Transaction simulation failed: {code}"),
            })
        }
    }
}

async fn handle_status(
    state: web::Data<SharedState>,
    tx: web::Path<String>,
    query: web::Query<StatusQuery>,
) -> HttpResponse {
    let commitment = match query.commitment.as_deref() {
        None => CommitmentLevel::default(),
        Some(raw) => match raw.parse::<CommitmentLevel>() {
            Ok(commitment) => commitment,
            Err(e) => {
                return HttpResponse::BadRequest().json(ErrorDetailDto { detail: e });
            }
        },
    };
    let tx = TxHandle::new(tx.into_inner());
    let status = state.lock().poll(&tx, commitment);
    match status {
        None => HttpResponse::NotFound().json(ErrorDetailDto {
            detail: format!("unknown transaction {tx}"),
        }),
        Some(status) => HttpResponse::Ok().json(match status {
            TxStatus::Pending => TransactionStatusDto::Pending,
            TxStatus::Confirmed => TransactionStatusDto::Ok,
            TxStatus::ProgramError(code) => TransactionStatusDto::ProgramError { code: code.0 },
        }),
    }
}

async fn handle_balance(
    state: web::Data<SharedState>,
    account: web::Path<String>,
) -> HttpResponse {
    let account = AccountId::new(account.into_inner());
    match state.lock().balance(&account) {
        Some(balance) => HttpResponse::Ok().json(BalanceDto { balance }),
        None => HttpResponse::NotFound().json(ErrorDetailDto {
            detail: format!("no account {account}"),
        }),
    }
}

async fn handle_airdrop(
    state: web::Data<SharedState>,
    account: web::Path<String>,
    body: web::Json<AirdropDto>,
) -> HttpResponse {
    let account = AccountId::new(account.into_inner());
    let mut guard = state.lock();
    guard.fund(account.clone(), body.amount);
    let balance = guard.balance(&account).unwrap_or_default();
    tracing::info!(%account, amount = body.amount, "airdrop");
    HttpResponse::Ok().json(BalanceDto { balance })
}

async fn handle_member(
    state: web::Data<SharedState>,
    account: web::Path<String>,
) -> HttpResponse {
    let account = AccountId::new(account.into_inner());
    match state.lock().member(&account) {
        Some(reserve) => HttpResponse::Ok().json(MemberDto { reserve }),
        None => HttpResponse::NotFound().json(ErrorDetailDto {
            detail: "No wallet found".to_string(),
        }),
    }
}

async fn handle_update_reserve(
    state: web::Data<SharedState>,
    path: web::Path<(String, String)>,
    body: web::Json<ReserveUpdateDto>,
) -> HttpResponse {
    let (account, secret) = path.into_inner();
    let account = AccountId::new(account);
    let result = state.lock().update_reserve(&account, &secret, body.reserve);
    match result {
        Ok(()) => HttpResponse::Ok().json(MemberDto {
            reserve: body.reserve,
        }),
        Err(ReserveUpdateError::Forbidden) => HttpResponse::Forbidden().json(ErrorDetailDto {
            detail: "invalid secret".to_string(),
        }),
        Err(ReserveUpdateError::UnknownMember) => {
            HttpResponse::NotFound().json(ErrorDetailDto {
                detail: "No wallet found".to_string(),
            })
        }
    }
}

#[allow(non_snake_case)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SandboxConfig;

    fn server() -> SandboxServer {
        let state = SharedState::new(SandboxConfig::default());
        SandboxServer::start(state, None).unwrap()
    }

    #[tokio::test]
    async fn state__serves_allocation_for_known_program_only() {
        // given
        let server = server();
        let client = reqwest::Client::new();

        // when
        let known = client
            .get(format!("{}/programs/mint/state", server.base_url()))
            .send()
            .await
            .unwrap();
        let unknown = client
            .get(format!("{}/programs/other/state", server.base_url()))
            .send()
            .await
            .unwrap();

        // then
        assert_eq!(unknown.status(), reqwest::StatusCode::NOT_FOUND);
        let dto: AllocationStateDto = known.json().await.unwrap();
        assert_eq!(
            dto,
            AllocationStateDto {
                items_available: 100,
                items_redeemed: 0,
                items_remaining: 100,
                go_live_at: 0,
            }
        );
    }

    #[tokio::test]
    async fn member__returns_404_for_unlisted_and_reserve_for_listed() {
        let server = server();
        server.state().lock().set_member(AccountId::new("alice"), 3);
        let client = reqwest::Client::new();

        let listed = client
            .get(format!("{}/member/alice", server.base_url()))
            .send()
            .await
            .unwrap();
        let unlisted = client
            .get(format!("{}/member/bob", server.base_url()))
            .send()
            .await
            .unwrap();

        assert_eq!(listed.json::<MemberDto>().await.unwrap().reserve, 3);
        assert_eq!(unlisted.status(), reqwest::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn update__requires_shared_secret() {
        // given
        let server = server();
        server.state().lock().set_member(AccountId::new("alice"), 3);
        let client = reqwest::Client::new();

        // when
        let forbidden = client
            .put(format!("{}/update/alice/wrong", server.base_url()))
            .json(&ReserveUpdateDto { reserve: 0 })
            .send()
            .await
            .unwrap();
        let accepted = client
            .put(format!("{}/update/alice/sandbox-secret", server.base_url()))
            .json(&ReserveUpdateDto { reserve: 2 })
            .send()
            .await
            .unwrap();

        // then
        assert_eq!(forbidden.status(), reqwest::StatusCode::FORBIDDEN);
        assert!(accepted.status().is_success());
        assert_eq!(server.state().lock().member(&AccountId::new("alice")), Some(2));
    }

    #[tokio::test]
    async fn airdrop__credits_balance() {
        let server = server();
        let client = reqwest::Client::new();

        let missing = client
            .get(format!("{}/accounts/alice/balance", server.base_url()))
            .send()
            .await
            .unwrap();
        client
            .post(format!("{}/accounts/alice/airdrop", server.base_url()))
            .json(&AirdropDto { amount: 42 })
            .send()
            .await
            .unwrap();
        let funded = client
            .get(format!("{}/accounts/alice/balance", server.base_url()))
            .send()
            .await
            .unwrap();

        assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);
        assert_eq!(funded.json::<BalanceDto>().await.unwrap().balance, 42);
    }

    #[tokio::test]
    async fn status__unknown_transaction_is_404_and_bad_commitment_is_400() {
        let server = server();
        let client = reqwest::Client::new();

        let unknown = client
            .get(format!("{}/transactions/nope", server.base_url()))
            .send()
            .await
            .unwrap();
        let bad = client
            .get(format!(
                "{}/transactions/nope?commitment=eventually",
                server.base_url()
            ))
            .send()
            .await
            .unwrap();

        assert_eq!(unknown.status(), reqwest::StatusCode::NOT_FOUND);
        assert_eq!(bad.status(), reqwest::StatusCode::BAD_REQUEST);
    }
}
