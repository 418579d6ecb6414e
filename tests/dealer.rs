//! Computations with a trusted dealer providing the preprocessed material.

use futures::future::join_all;
use polyshare::{
    Error,
    channel::{Channel, SimpleChannel},
    dealer::{Request, Response, dealer},
    error::ProtocolError,
    field::Gf127,
    preprocessing::Preprocessor,
    protocol::{Protocol, simulate_dot_product},
    setup::SetupParams,
    sharing::{Additive, AdditiveShare},
};

#[tokio::test]
async fn dealer_with_distant_index() -> Result<(), Error> {
    let inputs = vec![vec![1, 2, 3], vec![4, 5, 6]];
    let results =
        simulate_dot_product(Protocol::Mascot, None, Preprocessor::TrustedDealer(4), &inputs)
            .await?;
    assert_eq!(results, vec![32, 32]);
    Ok(())
}

/// Runs two Semi parties with three inputs each against a dealer with the given triple budget.
async fn with_budget(budget: usize) -> (Vec<Result<u128, Error>>, Result<(), Error>) {
    let mut channels = SimpleChannel::channels(3);
    let dealer_channel = channels.swap_remove(2);
    let parties = async move {
        let results = join_all(channels.iter().enumerate().map(async |(party, ch)| {
            let params = SetupParams {
                party,
                parties: 2,
                threshold: None,
            };
            let inputs = [1, 2, 3].map(|x| x + 3 * party as u128);
            Protocol::Semi
                .dot_product(ch, params, Preprocessor::TrustedDealer(2), &inputs)
                .await
        }))
        .await;
        // releases a dealer that still waits for requests
        drop(channels);
        results
    };
    let dealer = dealer::<Additive<Gf127>>(&dealer_channel, 2, None, Some(budget));
    tokio::join!(parties, dealer)
}

#[tokio::test]
async fn sufficient_budget_completes() {
    let (results, dealt) = with_budget(3).await;
    assert!(dealt.is_ok());
    for result in results {
        assert_eq!(result.unwrap(), 32);
    }
}

#[tokio::test]
async fn exhausted_budget_fails_all_parties() {
    let (results, dealt) = with_budget(2).await;
    for result in results {
        assert!(matches!(
            result,
            Err(Error::PreprocessingExhausted {
                kind: "triples",
                requested: 1
            })
        ));
    }
    assert!(matches!(dealt, Err(Error::Network(_))));
}

type SemiResponse = Response<Gf127, AdditiveShare<Gf127>>;

async fn send(ch: &SimpleChannel, req: &Request<Gf127>) {
    let bytes = bincode::serialize(req).unwrap();
    ch.send_bytes_to(2, bytes, "request").await.unwrap();
}

async fn recv(ch: &SimpleChannel) -> SemiResponse {
    let bytes = ch.recv_bytes_from(2, "response").await.unwrap();
    bincode::deserialize(&bytes).unwrap()
}

#[tokio::test]
async fn diverging_requests_abort_the_dealer() {
    let mut channels = SimpleChannel::channels(3);
    let dealer_channel = channels.swap_remove(2);
    let requests = [
        Request::Triples {
            needed: 1,
            wanted: 1024,
        },
        Request::InputMasks { count: 1024 },
    ];
    let parties = join_all(channels.iter().zip(&requests).map(async |(ch, req)| {
        send(ch, &Request::MacKeyShare(Gf127::from(0))).await;
        send(ch, req).await;
        recv(ch).await
    }));
    let (responses, dealt) = tokio::join!(
        parties,
        dealer::<Additive<Gf127>>(&dealer_channel, 2, None, None)
    );
    assert!(matches!(
        dealt,
        Err(Error::Protocol(ProtocolError::DealerRequestMismatch(_)))
    ));
    for response in responses {
        assert!(matches!(response, Response::Error(_)));
    }
}

#[tokio::test]
async fn dealer_rejects_a_threshold_for_additive_sharing() {
    let channels = SimpleChannel::channels(3);
    let result = dealer::<Additive<Gf127>>(&channels[2], 2, Some(1), None).await;
    assert!(matches!(result, Err(Error::Configuration(_))));
}
