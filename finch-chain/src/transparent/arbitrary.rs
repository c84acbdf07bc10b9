use proptest::{arbitrary::any, collection::vec, prelude::*};

use super::{Input, OutPoint, Output, Script, Witness};

impl Arbitrary for Script {
    type Parameters = ();

    fn arbitrary_with(_args: ()) -> Self::Strategy {
        vec(any::<u8>(), 0..100).prop_map(Script).boxed()
    }

    type Strategy = BoxedStrategy<Self>;
}

impl Arbitrary for OutPoint {
    type Parameters = ();

    fn arbitrary_with(_args: ()) -> Self::Strategy {
        (any::<crate::transaction::Hash>(), 0..100u32)
            .prop_map(|(hash, index)| OutPoint { hash, index })
            .boxed()
    }

    type Strategy = BoxedStrategy<Self>;
}

impl Arbitrary for Witness {
    type Parameters = ();

    fn arbitrary_with(_args: ()) -> Self::Strategy {
        vec(vec(any::<u8>(), 0..72), 0..4).prop_map(Witness).boxed()
    }

    type Strategy = BoxedStrategy<Self>;
}

impl Arbitrary for Output {
    type Parameters = ();

    fn arbitrary_with(_args: ()) -> Self::Strategy {
        ((0..=crate::amount::MAX_MONEY), any::<Script>())
            .prop_map(|(value, lock_script)| Output { value, lock_script })
            .boxed()
    }

    type Strategy = BoxedStrategy<Self>;
}

impl Arbitrary for Input {
    type Parameters = ();

    fn arbitrary_with(_args: ()) -> Self::Strategy {
        (
            any::<OutPoint>(),
            any::<Script>(),
            any::<u32>(),
            any::<Witness>(),
        )
            .prop_map(|(outpoint, unlock_script, sequence, witness)| Input {
                outpoint,
                unlock_script,
                sequence,
                witness,
            })
            .boxed()
    }

    type Strategy = BoxedStrategy<Self>;
}

