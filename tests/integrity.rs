//! Runs the protocol components step by step, with one party deviating from the protocol.

use futures::future::{join_all, try_join_all};
use polyshare::{
    Error,
    channel::SimpleChannel,
    error::IntegrityError,
    field::{Gf61, Gf127, Ring},
    preprocessing::Preprocessor,
    protocol::ProtocolSet,
    setup::{ProtocolSetup, SetupParams},
    sharing::{AdditiveMac, MacShare, MalShamir, Scheme},
};
use rand::{SeedableRng, rngs::StdRng};

const CHEATER: usize = 1;

/// Computes `[1, 2, 3] * [4, 5, 6]` with MASCOT, the cheater adds 1 to its MAC share of the result.
async fn tampered_result(party: usize, channel: &SimpleChannel) -> Result<Gf127, Error> {
    let params = SetupParams {
        party,
        parties: 2,
        threshold: None,
    };
    let setup =
        ProtocolSetup::<AdditiveMac<Gf127>, _>::new(channel, params, Preprocessor::SharedSeed)
            .await?;
    let inputs = if party == 0 { [1u32, 2, 3] } else { [4, 5, 6] };
    let inputs = inputs.into_iter().map(Gf127::from).collect();
    let ProtocolSet {
        mut input,
        mut protocol,
        mut output,
    } = ProtocolSet::new(&setup, inputs);

    input.reset_all();
    for i in 0..3 {
        input.add_from_all(i)?;
    }
    input.exchange().await?;
    protocol.init_dotprod();
    for _ in 0..3 {
        let (a, b) = (input.finalize(0)?, input.finalize(1)?);
        protocol.prepare_dotprod(&a, &b).await?;
    }
    protocol.next_dotprod()?;
    protocol.exchange().await?;
    let mut c = protocol.finalize_dotprod(3)?;
    if party == CHEATER {
        c.mac += Gf127::ONE;
    }
    // the masked factors were not touched
    protocol.check().await?;

    output.init_open();
    output.prepare_open(c)?;
    output.exchange().await?;
    let result = output.finalize_open()?;
    assert_eq!(result, Gf127::from(32));
    output.check().await?;
    Ok(result)
}

#[tokio::test]
async fn corrupted_result_mac_is_detected() {
    let channels = SimpleChannel::channels(2);
    let results = join_all(
        channels
            .iter()
            .enumerate()
            .map(async |(party, ch)| tampered_result(party, ch).await),
    )
    .await;
    for result in results {
        match result {
            Err(e) => {
                assert!(e.is_integrity_failure());
                assert!(matches!(e, Error::Integrity(IntegrityError::MacMismatch(1))));
            }
            Ok(v) => panic!("tampering went unnoticed, opened {v}"),
        }
    }
}

#[tokio::test]
async fn tampered_openings_are_detected_in_every_trial() -> Result<(), Error> {
    let trials: u32 = 1000;
    let channels = SimpleChannel::channels(2);
    let detected = try_join_all(channels.iter().enumerate().map(async |(party, ch)| {
        let params = SetupParams {
            party,
            parties: 2,
            threshold: None,
        };
        let setup =
            ProtocolSetup::<AdditiveMac<Gf61>, _>::new(ch, params, Preprocessor::SharedSeed)
                .await?;
        let scheme = setup.scheme();
        let mut output = ProtocolSet::new(&setup, vec![]).output;
        let mut rng = StdRng::seed_from_u64(party as u64);
        let mut detected = 0;
        for trial in 0..trials {
            let mut share = scheme.add_public(&scheme.zero(), Gf61::from(trial));
            if party == CHEATER {
                let delta = loop {
                    let d = Gf61::random(&mut rng);
                    if d != Gf61::ZERO {
                        break d;
                    }
                };
                // shift the opened value and try to cover it with a guessed MAC
                share = MacShare {
                    value: share.value + delta,
                    mac: share.mac + Gf61::random(&mut rng),
                };
            }
            output.init_open();
            output.prepare_open(share)?;
            output.exchange().await?;
            output.finalize_open()?;
            match output.check().await {
                Err(Error::Integrity(_)) => detected += 1,
                Err(e) => return Err(e),
                Ok(()) => {}
            }
        }
        Ok::<_, Error>(detected)
    }))
    .await?;
    for detected in detected {
        assert!(detected * 1000 >= trials * 999, "only {detected} of {trials} detected");
    }
    Ok(())
}

#[tokio::test]
async fn inconsistent_shamir_opening_is_detected() {
    let parties = 3;
    let channels = SimpleChannel::channels(parties);
    let results = join_all(channels.iter().enumerate().map(async |(party, ch)| {
        let params = SetupParams {
            party,
            parties,
            threshold: Some(1),
        };
        let setup =
            ProtocolSetup::<MalShamir<Gf127>, _>::new(ch, params, Preprocessor::SharedSeed)
                .await?;
        let scheme = setup.scheme();
        let mut share = scheme.add_public(&scheme.zero(), Gf127::from(7));
        if party == 2 {
            share.y += Gf127::ONE;
        }
        let mut output = ProtocolSet::new(&setup, vec![]).output;
        output.init_open();
        output.prepare_open(share)?;
        output.exchange().await?;
        // the first two points still interpolate to the correct value
        assert_eq!(output.finalize_open()?, Gf127::from(7));
        output.check().await?;
        assert!(output.finalize_open().is_err());
        Ok::<_, Error>(())
    }))
    .await;
    for result in results {
        assert!(matches!(
            result,
            Err(Error::Integrity(IntegrityError::InconsistentShares(1)))
        ));
    }
}
