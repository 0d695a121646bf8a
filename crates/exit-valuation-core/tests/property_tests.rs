use exit_valuation_core::cap_table::{
    AntiDilutionMethod, CapTable, CompanyStage, Rights, ShareClass, ShareholdingEntry,
};
use exit_valuation_core::dilution::adjust;
use exit_valuation_core::scenarios::{generate_scenarios_core, CompanyFactors, ScenarioGeneratorInput};
use exit_valuation_core::waterfall::{run_waterfall, WaterfallInput};
use exit_valuation_core::EngineAssumptions;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const TOLERANCE: Decimal = dec!(0.01);

fn cents(n: u64) -> Decimal {
    Decimal::new(n as i64, 2)
}

/// Common, an option pool and up to two priced series.
fn multi_class_table(
    common: u64,
    options: u64,
    a_shares: u64,
    a_price_cents: u64,
    b_shares: u64,
    b_price_cents: u64,
    b_participating: bool,
) -> CapTable {
    let mut entries = vec![
        ShareholdingEntry::new("Founders", ShareClass::Common, Decimal::from(common), dec!(0.001)),
        ShareholdingEntry::new("Pool", ShareClass::Options, Decimal::from(options), dec!(0.10)),
        ShareholdingEntry::new("Fund A", ShareClass::SeriesA, Decimal::from(a_shares), cents(a_price_cents)),
    ];
    if b_shares > 0 {
        entries.push(
            ShareholdingEntry::new("Fund B", ShareClass::SeriesB, Decimal::from(b_shares), cents(b_price_cents))
                .with_rights(Rights {
                    participating: b_participating,
                    ..Rights::default()
                }),
        );
    }
    CapTable::new(CompanyStage::SeriesB, entries)
}

fn single_series_table(common: u64, options: u64, shares: u64, price_cents: u64, rights: Rights) -> CapTable {
    CapTable::new(
        CompanyStage::SeriesA,
        vec![
            ShareholdingEntry::new("Founders", ShareClass::Common, Decimal::from(common), dec!(0.001)),
            ShareholdingEntry::new("Pool", ShareClass::Options, Decimal::from(options), dec!(0.10)),
            ShareholdingEntry::new("Investor", ShareClass::SeriesA, Decimal::from(shares), cents(price_cents))
                .with_rights(rights),
        ],
    )
}

/// Common, a pool, non-participating Series A with a mixed multiple,
/// capped participating Series B and an optional senior Series C.
#[allow(clippy::too_many_arguments)]
fn stacked_table(
    common: u64,
    options: u64,
    a_shares: u64,
    a_multiple_tenths: u64,
    b_shares: u64,
    b_cap_tenths: u64,
    c_shares: u64,
    c_multiple_tenths: u64,
) -> CapTable {
    let mut entries = vec![
        ShareholdingEntry::new("Founders", ShareClass::Common, Decimal::from(common), dec!(0.001)),
        ShareholdingEntry::new("Pool", ShareClass::Options, Decimal::from(options), dec!(0.10)),
        ShareholdingEntry::new("Fund A", ShareClass::SeriesA, Decimal::from(a_shares), dec!(1.00))
            .with_rights(Rights {
                liquidation_preference_multiple: Decimal::new(a_multiple_tenths as i64, 1),
                ..Rights::default()
            }),
        ShareholdingEntry::new("Fund B", ShareClass::SeriesB, Decimal::from(b_shares), dec!(2.50))
            .with_rights(Rights {
                participating: true,
                participation_cap: Some(Decimal::new(b_cap_tenths as i64, 1)),
                ..Rights::default()
            }),
    ];
    if c_shares > 0 {
        entries.push(
            ShareholdingEntry::new("Fund C", ShareClass::SeriesC, Decimal::from(c_shares), dec!(6.00))
                .with_rights(Rights {
                    liquidation_preference_multiple: Decimal::new(c_multiple_tenths as i64, 1),
                    ..Rights::default()
                }),
        );
    }
    CapTable::new(CompanyStage::SeriesC, entries)
}

fn total_for(table: &CapTable, exit: Decimal, holder: &str) -> Decimal {
    let (out, _) = run_waterfall(&WaterfallInput::new(exit, table.clone())).unwrap();
    out.for_holder(holder).map(|d| d.total).unwrap_or(Decimal::ZERO)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn distributions_sum_to_distributable(
        common in 1_000_000u64..20_000_000,
        options in 0u64..2_000_000,
        a_shares in 100_000u64..5_000_000,
        a_price in 10u64..500,
        b_shares in 0u64..5_000_000,
        b_price in 50u64..2_000,
        b_participating in any::<bool>(),
        exit_k in 0u64..500_000,
        escrow_pct in 0u64..30,
    ) {
        let table = multi_class_table(common, options, a_shares, a_price, b_shares, b_price, b_participating);
        let mut input = WaterfallInput::new(Decimal::from(exit_k) * dec!(1000), table);
        input.escrow_fraction = Decimal::new(escrow_pct as i64, 2);
        let (out, _) = run_waterfall(&input).unwrap();
        prop_assert!((out.total_distributed() - out.distributable).abs() <= TOLERANCE);
        prop_assert!(out.distributions.iter().all(|d| d.total >= Decimal::ZERO));
    }

    #[test]
    fn larger_exit_never_pays_anyone_less(
        common in 1_000_000u64..20_000_000,
        options in 0u64..2_000_000,
        shares in 100_000u64..5_000_000,
        price in 10u64..500,
        exit_k in 0u64..200_000,
        step_k in 1u64..50_000,
    ) {
        let table = single_series_table(common, options, shares, price, Rights::default());
        let low = Decimal::from(exit_k) * dec!(1000);
        let high = low + Decimal::from(step_k) * dec!(1000);
        for holder in ["Founders", "Pool", "Investor"] {
            prop_assert!(total_for(&table, high, holder) + TOLERANCE >= total_for(&table, low, holder));
        }
    }

    #[test]
    fn non_participating_keeps_its_preference_floor(
        common in 1_000_000u64..20_000_000,
        shares in 100_000u64..5_000_000,
        price in 10u64..500,
        multiple_tenths in 10u64..30,
        exit_k in 0u64..100_000,
    ) {
        let rights = Rights {
            liquidation_preference_multiple: Decimal::new(multiple_tenths as i64, 1),
            ..Rights::default()
        };
        let table = single_series_table(common, 0, shares, price, rights.clone());
        let exit = Decimal::from(exit_k) * dec!(1000);
        let claim = Decimal::from(shares) * cents(price) * rights.liquidation_preference_multiple;
        prop_assert!(total_for(&table, exit, "Investor") + TOLERANCE >= claim.min(exit));
    }

    #[test]
    fn capped_participation_never_exceeds_cap(
        common in 1_000_000u64..20_000_000,
        shares in 100_000u64..5_000_000,
        price in 10u64..500,
        cap_tenths in 10u64..50,
        exit_k in 0u64..500_000,
    ) {
        let cap = Decimal::new(cap_tenths as i64, 1);
        let rights = Rights {
            participating: true,
            participation_cap: Some(cap),
            ..Rights::default()
        };
        let table = single_series_table(common, 0, shares, price, rights);
        let invested = Decimal::from(shares) * cents(price);
        let exit = Decimal::from(exit_k) * dec!(1000);
        prop_assert!(total_for(&table, exit, "Investor") <= cap * invested + TOLERANCE);
    }

    #[test]
    fn stacked_larger_exit_never_pays_anyone_less(
        common in 1_000_000u64..20_000_000,
        options in 0u64..2_000_000,
        a_shares in 100_000u64..5_000_000,
        a_multiple in 10u64..25,
        b_shares in 100_000u64..3_000_000,
        b_cap in 15u64..40,
        c_shares in 0u64..2_000_000,
        c_multiple in 10u64..20,
        exit_k in 0u64..300_000,
        step_k in 1u64..50_000,
    ) {
        let table = stacked_table(common, options, a_shares, a_multiple, b_shares, b_cap, c_shares, c_multiple);
        let low = Decimal::from(exit_k) * dec!(1000);
        let high = low + Decimal::from(step_k) * dec!(1000);
        for holder in ["Founders", "Pool", "Fund A", "Fund B", "Fund C"] {
            prop_assert!(total_for(&table, high, holder) + TOLERANCE >= total_for(&table, low, holder));
        }
    }

    #[test]
    fn stacked_senior_class_keeps_its_floor_and_cap_holds(
        common in 1_000_000u64..20_000_000,
        a_shares in 100_000u64..5_000_000,
        a_multiple in 10u64..25,
        b_shares in 100_000u64..3_000_000,
        b_cap in 15u64..40,
        c_shares in 0u64..2_000_000,
        c_multiple in 10u64..20,
        exit_k in 0u64..300_000,
    ) {
        let table = stacked_table(common, 0, a_shares, a_multiple, b_shares, b_cap, c_shares, c_multiple);
        let exit = Decimal::from(exit_k) * dec!(1000);

        // the most senior class is paid first, whether it converts or not
        let (senior, claim) = if c_shares > 0 {
            ("Fund C", Decimal::from(c_shares) * dec!(6.00) * Decimal::new(c_multiple as i64, 1))
        } else {
            ("Fund B", Decimal::from(b_shares) * dec!(2.50))
        };
        prop_assert!(total_for(&table, exit, senior) + TOLERANCE >= claim.min(exit));

        let b_invested = Decimal::from(b_shares) * dec!(2.50);
        let b_cap_total = Decimal::new(b_cap as i64, 1) * b_invested;
        prop_assert!(total_for(&table, exit, "Fund B") <= b_cap_total + TOLERANCE);
    }

    #[test]
    fn scenario_probabilities_normalise(
        valuation_m in 1u64..5_000,
        stage_idx in 0usize..7,
        rounds in 0usize..7,
        growth_pct in proptest::option::of(0u64..400),
        runway in proptest::option::of(0u64..48),
    ) {
        let path = ["seed", "A", "B", "C", "D", "E"][..rounds.min(6)].join(",");
        let input = ScenarioGeneratorInput {
            funding_path: path,
            current_valuation: Decimal::from(valuation_m) * dec!(1_000_000),
            company_stage: CompanyStage::ALL[stage_idx],
            factors: CompanyFactors {
                growth_rate: growth_pct.map(|g| Decimal::new(g as i64, 2)),
                runway_months: runway.map(Decimal::from),
                trailing_revenue: None,
            },
            assumptions: EngineAssumptions::default(),
        };
        let (set, _) = generate_scenarios_core(&input).unwrap();
        let total: Decimal = set.scenarios.iter().map(|s| s.probability).sum();
        prop_assert!((total - Decimal::ONE).abs() <= dec!(0.000000001));
    }

    #[test]
    fn up_round_never_adjusts(
        price_cents in 1u64..10_000,
        premium_cents in 0u64..10_000,
        shares in 0u64..10_000_000,
        outstanding in 1u64..100_000_000,
        ratchet in any::<bool>(),
    ) {
        let method = if ratchet {
            AntiDilutionMethod::FullRatchet
        } else {
            AntiDilutionMethod::WeightedAverage
        };
        let original = cents(price_cents);
        let adj = adjust(
            original,
            original + cents(premium_cents),
            Decimal::from(shares),
            Some(Decimal::from(outstanding)),
            method,
        )
        .unwrap();
        prop_assert_eq!(adj.adjusted_price, original);
        prop_assert_eq!(adj.additional_shares, Decimal::ZERO);
    }
}
