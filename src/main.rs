use std::path::Path;

use ncdm::{
    Cdm, DEFAULT_BATCH_SIZE, DEFAULT_EPOCHS, DEFAULT_LR, NCDM, NetConfig, Result, TrainConfig,
    infer_dimensions, into_batches, load_response_logs,
};

// CLI 解析辅助函数
fn arg_has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

fn parse_str_arg<'a>(args: &'a [String], key: &str) -> Option<&'a str> {
    let prefix = format!("{}=", key);
    args.iter()
        .find_map(|a| a.strip_prefix(prefix.as_str()))
        .filter(|v| !v.is_empty())
}

fn parse_usize_arg(args: &[String], key: &str) -> Option<usize> {
    parse_str_arg(args, key).and_then(|v| v.parse::<usize>().ok())
}

fn parse_u64_arg(args: &[String], key: &str) -> Option<u64> {
    parse_str_arg(args, key).and_then(|v| v.parse::<u64>().ok())
}

fn parse_f32_arg(args: &[String], key: &str) -> Option<f32> {
    parse_str_arg(args, key).and_then(|v| v.parse::<f32>().ok())
}

fn print_usage() {
    println!("用法: ncdm --train=<train.json> [选项]");
    println!();
    println!("  --train=PATH        训练集（作答记录 JSON）");
    println!("  --test=PATH         测试集，每个 epoch 结束后评估");
    println!("  --knowledge-n=N     知识点数量（默认按数据推断）");
    println!("  --cognitive-n=N     认知维度数量（默认按数据推断）");
    println!("  --student-n=N       学生数量（默认按数据推断）");
    println!("  --exer-n=N          题目数量（默认按数据推断）");
    println!("  --epochs=N          训练轮数 (默认 {})", DEFAULT_EPOCHS);
    println!("  --lr=F              学习率 (默认 {})", DEFAULT_LR);
    println!("  --batch-size=N      批大小 (默认 {})", DEFAULT_BATCH_SIZE);
    println!("  --device=TAG        cpu | cuda[:N] | mps (仅支持 cpu)");
    println!("  --seed=N            参数初始化随机种子");
    println!("  --load=PATH         训练前加载参数");
    println!("  --save=PATH         训练后保存参数 (.json 为 JSON 格式)");
    println!("  --record=PATH       训练记录输出 (JSON)");
    println!("  --silence           不打印每个 epoch 的结果");
}

fn run(args: &[String]) -> Result<()> {
    let Some(train_path) = parse_str_arg(args, "--train") else {
        print_usage();
        return Ok(());
    };

    let train_logs = load_response_logs(train_path)?;
    let test_logs = match parse_str_arg(args, "--test") {
        Some(path) => load_response_logs(path)?,
        None => Vec::new(),
    };

    // 维度取命令行参数和数据推断值中较大的一个
    let mut all_logs = train_logs.clone();
    all_logs.extend(test_logs.iter().cloned());
    let inferred = infer_dimensions(&all_logs);
    let knowledge_n = parse_usize_arg(args, "--knowledge-n")
        .unwrap_or(0)
        .max(inferred.knowledge_n);
    let cognitive_n = parse_usize_arg(args, "--cognitive-n")
        .unwrap_or(0)
        .max(inferred.cognitive_n)
        .max(1);
    let student_n = parse_usize_arg(args, "--student-n")
        .unwrap_or(0)
        .max(inferred.student_n);
    let exer_n = parse_usize_arg(args, "--exer-n")
        .unwrap_or(0)
        .max(inferred.exer_n);

    println!(
        "数据: 训练 {} 条, 测试 {} 条 | 学生 {}, 题目 {}, 知识点 {}, 认知维度 {}",
        train_logs.len(),
        test_logs.len(),
        student_n,
        exer_n,
        knowledge_n,
        cognitive_n
    );

    let batch_size = parse_usize_arg(args, "--batch-size").unwrap_or(DEFAULT_BATCH_SIZE);
    let train_data = into_batches(&train_logs, batch_size, knowledge_n, cognitive_n)?;
    let test_data = into_batches(&test_logs, batch_size, knowledge_n, cognitive_n)?;

    let mut config = NetConfig::new(knowledge_n, exer_n, student_n, cognitive_n);
    if let Some(seed) = parse_u64_arg(args, "--seed") {
        config = config.with_seed(seed);
    }
    let mut model = NCDM::with_config(&config)?;

    if let Some(path) = parse_str_arg(args, "--load") {
        model.load(path)?;
    }

    let train_config = TrainConfig {
        epoch: parse_usize_arg(args, "--epochs").unwrap_or(DEFAULT_EPOCHS),
        lr: parse_f32_arg(args, "--lr").unwrap_or(DEFAULT_LR),
        device: parse_str_arg(args, "--device").unwrap_or("cpu").to_string(),
        silence: arg_has_flag(args, "--silence"),
    };
    let test_data = (!test_data.is_empty()).then_some(test_data.as_slice());
    let record = model.train_with_config(&train_data, test_data, &train_config)?;

    if let Some(last) = record.last_epoch() {
        println!("✓ 训练完成: {} epochs, 最终平均损失 {:.6}", record.epochs.len(), last.mean_loss);
    }

    if let Some(path) = parse_str_arg(args, "--save") {
        if let Some(dir) = Path::new(path).parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        model.save(path)?;
        println!("💾 参数已保存: {}", path);
    }

    if let Some(path) = parse_str_arg(args, "--record") {
        record.save_json(path)?;
    }

    Ok(())
}

fn main() {
    // 初始化日志系统
    if let Err(e) = simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .init()
    {
        eprintln!("日志初始化失败: {}", e);
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    if arg_has_flag(&args, "--help") || arg_has_flag(&args, "-h") {
        print_usage();
        return;
    }

    if let Err(e) = run(&args) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}
